//! One read attempt of a stream: a producer on the calling thread and one lane thread per
//! enabled consumer, all scoped to the attempt.

use crossbeam_channel::{Receiver, bounded};
use std::io::Read;
use std::thread;

use crate::ConsumerResult;
use crate::engine::block::BlockPool;
use crate::engine::consumer::{ConsumerSet, NamedConsumer};
use crate::engine::progress::ProgressCounters;
use crate::engine::reader::{LaneMsg, ProduceEnd, ReadWindow, produce_blocks};
use crate::error::{AttemptError, Phase, panic_message};
use crate::utils::CancelToken;

/// Name prefix of consumer lane threads; the consumer name follows.
pub const LANE_THREAD_PREFIX: &str = "fanhash-lane-";

/// True on a consumer lane thread.
pub fn on_consumer_lane() -> bool {
    thread::current()
        .name()
        .is_some_and(|n| n.starts_with(LANE_THREAD_PREFIX))
}

/// Shared, per-run inputs of every attempt.
pub struct FanoutCtx<'a> {
    pub consumers: &'a ConsumerSet,
    pub pool: &'a BlockPool,
    pub window: ReadWindow,
    pub cancel: &'a CancelToken,
    pub progress: &'a ProgressCounters,
}

#[derive(Debug)]
pub enum FanoutEnd {
    /// EOF reached and every consumer finished. Results are in registration order.
    Completed {
        bytes: u64,
        blocks: u64,
        results: Vec<ConsumerResult>,
    },
    Cancelled,
}

/// A failed attempt and the state it failed in.
#[derive(Debug)]
pub struct AttemptFailure {
    pub phase: Phase,
    pub cause: AttemptError,
}

enum LaneEnd {
    Finished(ConsumerResult),
    /// Producer went away without an `End` marker.
    Aborted,
    OutOfOrder { expected: u64, got: u64 },
}

fn run_lane(
    mut consumer: NamedConsumer,
    kind: usize,
    rx: Receiver<LaneMsg>,
    progress: &ProgressCounters,
) -> LaneEnd {
    let mut expected = 0_u64;
    for msg in rx.iter() {
        match msg {
            LaneMsg::Block(block) => {
                if block.sequence() != expected {
                    return LaneEnd::OutOfOrder {
                        expected,
                        got: block.sequence(),
                    };
                }
                consumer.inner.consume(block.bytes());
                progress.add_bytes_read(kind, block.len() as u64);
                expected += 1;
            }
            LaneMsg::End => return LaneEnd::Finished(consumer.finish()),
        }
    }
    LaneEnd::Aborted
}

/// Read `reader` once from its current position to EOF, feeding every block to a fresh instance
/// of each enabled consumer. Lanes are joined before returning, so every block of the attempt is
/// back in the pool (or about to be) when this returns.
pub fn fan_out(
    reader: &mut dyn Read,
    size_hint: u64,
    ctx: &FanoutCtx<'_>,
) -> Result<FanoutEnd, AttemptFailure> {
    thread::scope(|s| {
        let mut lanes = Vec::with_capacity(ctx.consumers.len());
        let mut handles = Vec::with_capacity(ctx.consumers.len());
        for (kind, factory) in ctx.consumers.iter().enumerate() {
            // Never more blocks in flight than the pool holds, so sends never block.
            let (tx, rx) = bounded(ctx.pool.block_count());
            let consumer = NamedConsumer::from_factory(factory.as_ref());
            let progress = ctx.progress;
            let spawned = thread::Builder::new()
                .name(format!("{}{}", LANE_THREAD_PREFIX, factory.name()))
                .spawn_scoped(s, move || run_lane(consumer, kind, rx, progress));
            match spawned {
                Ok(handle) => handles.push((factory.name().to_string(), handle)),
                // Lanes already started see their sender dropped and end as aborted.
                Err(e) => {
                    return Err(AttemptFailure {
                        phase: Phase::Reading,
                        cause: AttemptError::Io(e),
                    });
                }
            }
            lanes.push(tx);
        }

        let produced = produce_blocks(
            reader,
            size_hint,
            ctx.window,
            ctx.pool,
            &lanes,
            ctx.cancel,
            ctx.progress,
        );
        drop(lanes);

        let mut results = Vec::with_capacity(handles.len());
        let mut lane_error = None;
        for (name, handle) in handles {
            match handle.join() {
                Ok(LaneEnd::Finished(result)) => results.push(result),
                Ok(LaneEnd::Aborted) => {}
                Ok(LaneEnd::OutOfOrder { expected, got }) => {
                    lane_error.get_or_insert(AttemptError::OutOfOrder {
                        consumer: name,
                        expected,
                        got,
                    });
                }
                Err(payload) => {
                    lane_error.get_or_insert(AttemptError::ConsumerPanicked {
                        consumer: name,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }

        let fail = |phase, cause| Err(AttemptFailure { phase, cause });
        match (produced, lane_error) {
            (Err(e), _) => fail(Phase::Reading, AttemptError::Io(e)),
            (Ok(ProduceEnd::Cancelled), _) => Ok(FanoutEnd::Cancelled),
            (Ok(ProduceEnd::Eof { .. }), Some(cause)) => fail(Phase::Finalizing, cause),
            (Ok(ProduceEnd::LanesClosed), Some(cause)) => fail(Phase::Reading, cause),
            (Ok(ProduceEnd::LanesClosed), None) => fail(Phase::Reading, AttemptError::LanesClosed),
            (Ok(ProduceEnd::Eof { bytes, blocks }), None) => Ok(FanoutEnd::Completed {
                bytes,
                blocks,
                results,
            }),
        }
    })
}
