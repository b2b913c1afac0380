//! Multi-worker driver: one puller thread admits and opens streams, one worker per global permit
//! consumes them. Errors and terminal outcomes come back on a single event channel.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::FileDigests;
use crate::engine::block::BlockPool;
use crate::engine::consumer::ConsumerSet;
use crate::engine::fanout::FanoutCtx;
use crate::engine::progress::ProgressCounters;
use crate::engine::reader::ReadWindow;
use crate::engine::stream::{RetryPolicy, StreamOutcome, consume_stream};
use crate::error::{ErrorReport, FileError, Phase};
use crate::utils::CancelToken;
use crate::utils::config::{BufferConsts, EVENT_CHANNEL_CAP};

use super::provider::{ProvidedStream, StreamProvider};

/// Per-run settings of the consumption engine.
#[derive(Clone)]
pub struct PipelineConfig {
    pub consumers: ConsumerSet,
    /// Buffer budget per worker, in bytes.
    pub buffer_length: usize,
    pub window: ReadWindow,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn new(consumers: ConsumerSet) -> Self {
        Self {
            consumers,
            buffer_length: BufferConsts::BUFFER_LENGTH,
            window: ReadWindow::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Something a worker (or the puller) has to tell the caller.
#[derive(Debug)]
pub enum FileEvent {
    /// One failed attempt. Sent before the matching `Finished` (if any).
    Error(FileError),
    /// Exactly one per admitted stream, plus one `Failed` per stream that could not be opened.
    Finished(StreamOutcome),
}

/// Receiver and thread handles of a running pipeline. Drain `event_rx` until it closes, then
/// join `puller` and `workers`.
pub struct PipelineHandles {
    pub event_rx: Receiver<FileEvent>,
    pub puller: JoinHandle<()>,
    pub workers: Vec<JoinHandle<()>>,
}

/// Counts over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Attempts that failed and were retried.
    pub retried: u64,
    /// Bytes of the completed files.
    pub bytes: u64,
}

impl RunSummary {
    pub fn record(&mut self, event: &FileEvent) {
        match event {
            FileEvent::Error(e) if e.will_retry => self.retried += 1,
            FileEvent::Error(_) => {}
            FileEvent::Finished(StreamOutcome::Completed(d)) => {
                self.completed += 1;
                self.bytes += d.size;
            }
            FileEvent::Finished(StreamOutcome::Failed { .. }) => self.failed += 1,
            FileEvent::Finished(StreamOutcome::Cancelled(_)) => self.cancelled += 1,
        }
    }
}

fn spawn_puller(
    provider: &StreamProvider,
    stream_tx: Sender<ProvidedStream>,
    event_tx: Sender<FileEvent>,
    cancel: &CancelToken,
    progress: Arc<ProgressCounters>,
) -> JoinHandle<()> {
    let streams = provider.streams(cancel);
    thread::spawn(move || {
        for item in streams {
            match item {
                // Rendezvous channel: the stream is handed straight to an idle worker.
                Ok(stream) => {
                    if stream_tx.send(stream).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    progress.file_failed();
                    let path = e.path.clone();
                    let _ = event_tx.send(FileEvent::Error(e));
                    let _ = event_tx.send(FileEvent::Finished(StreamOutcome::Failed {
                        path,
                        retry_count: 0,
                    }));
                }
            }
        }
        debug!("puller: no more streams");
    })
}

fn spawn_worker(
    id: usize,
    pool: BlockPool,
    config: PipelineConfig,
    stream_rx: Receiver<ProvidedStream>,
    event_tx: Sender<FileEvent>,
    cancel: CancelToken,
    progress: Arc<ProgressCounters>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let ctx = FanoutCtx {
            consumers: &config.consumers,
            pool: &pool,
            window: config.window,
            cancel: &cancel,
            progress: &progress,
        };
        for stream in stream_rx.iter() {
            let outcome = consume_stream(stream, &ctx, &config.retry, &mut |e: FileError| {
                let _ = event_tx.send(FileEvent::Error(e));
            });
            if event_tx.send(FileEvent::Finished(outcome)).is_err() {
                break;
            }
        }
        debug!("worker {}: exiting", id);
    })
}

/// Start the puller and one worker per global permit. The read window is checked and buffer
/// pools are allocated up front, so a bad configuration fails here instead of inside a worker.
/// Sets progress totals from the provider's queue.
pub fn run_pipeline(
    provider: &StreamProvider,
    config: &PipelineConfig,
    cancel: &CancelToken,
    progress: &Arc<ProgressCounters>,
) -> Result<PipelineHandles> {
    config.window.check()?;
    let totals = provider.totals();
    progress.set_totals(totals.file_count, totals.total_bytes);

    let worker_count = provider.admission().partitions().global_limit.max(1);
    let pools = (0..worker_count)
        .map(|_| BlockPool::for_budget(config.buffer_length, config.window.max))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Starting {} workers, {} blocks x {} bytes each",
        worker_count,
        pools.first().map_or(0, BlockPool::block_count),
        config.window.max
    );

    let (stream_tx, stream_rx) = bounded::<ProvidedStream>(0);
    let (event_tx, event_rx) = bounded::<FileEvent>(EVENT_CHANNEL_CAP);

    let workers = pools
        .into_iter()
        .enumerate()
        .map(|(id, pool)| {
            spawn_worker(
                id,
                pool,
                config.clone(),
                stream_rx.clone(),
                event_tx.clone(),
                cancel.clone(),
                Arc::clone(progress),
            )
        })
        .collect();
    let puller = spawn_puller(provider, stream_tx, event_tx, cancel, Arc::clone(progress));

    Ok(PipelineHandles {
        event_rx,
        puller,
        workers,
    })
}

/// Join the puller and every worker after `event_rx` has closed.
pub fn shutdown_pipeline_handles(puller: JoinHandle<()>, workers: Vec<JoinHandle<()>>) -> Result<()> {
    puller
        .join()
        .map_err(|_| anyhow!("stream puller thread panicked"))?;
    for h in workers {
        h.join().map_err(|_| anyhow!("stream worker thread panicked"))?;
    }
    Ok(())
}

/// Run the pipeline to the end on the calling thread: `on_completed` exactly once per file that
/// finished, `on_error` once per failed attempt. An `on_completed` error is logged as a reporting
/// failure and the file counts as failed.
pub fn consume_streams(
    provider: &StreamProvider,
    config: &PipelineConfig,
    cancel: &CancelToken,
    progress: &Arc<ProgressCounters>,
    on_completed: &mut dyn FnMut(&FileDigests) -> Result<()>,
    on_error: &mut dyn FnMut(&FileError),
) -> Result<RunSummary> {
    let PipelineHandles {
        event_rx,
        puller,
        workers,
    } = run_pipeline(provider, config, cancel, progress)?;

    let mut summary = RunSummary::default();
    for event in event_rx.iter() {
        summary.record(&event);
        match &event {
            FileEvent::Error(e) => on_error(e),
            FileEvent::Finished(StreamOutcome::Completed(digests)) => {
                if let Err(e) = on_completed(digests) {
                    report_callback_failure(digests.path.clone(), &e);
                    summary.completed -= 1;
                    summary.bytes -= digests.size;
                    summary.failed += 1;
                }
            }
            FileEvent::Finished(_) => {}
        }
    }
    debug!("main: event channel closed, {:?}", summary);

    shutdown_pipeline_handles(puller, workers)?;
    Ok(summary)
}

fn report_callback_failure(path: PathBuf, e: &anyhow::Error) {
    ErrorReport {
        phase: Phase::Reporting,
        path: Some(path),
        retry_count: 0,
        will_retry: false,
        cause: format!("{e:#}"),
    }
    .log();
}
