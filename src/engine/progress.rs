//! Progress counters shared by every worker, and the kdam bar that displays them.

use crossbeam_channel::{Sender, bounded};
use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::utils::config::ProgressConsts;

/// Process-wide counters. Written from producer and lane threads, read by the display.
/// Relaxed ordering throughout: this is a human-facing indicator, not a consistency boundary.
pub struct ProgressCounters {
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    bytes_produced: AtomicU64,
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    consumer_names: Vec<String>,
    bytes_per_consumer: Vec<AtomicU64>,
}

/// Point-in-time copy of [`ProgressCounters`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_files: u64,
    pub total_bytes: u64,
    pub bytes_produced: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    /// `(consumer name, bytes consumed)` in registration order.
    pub bytes_per_consumer: Vec<(String, u64)>,
}

impl ProgressSnapshot {
    /// Bytes every consumer has finished with (the slowest consumer's count).
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_per_consumer
            .iter()
            .map(|(_, n)| *n)
            .min()
            .unwrap_or(self.bytes_produced)
    }
}

impl ProgressCounters {
    pub fn new<S: AsRef<str>>(consumer_names: &[S]) -> Self {
        Self {
            total_files: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            bytes_produced: AtomicU64::new(0),
            files_completed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            consumer_names: consumer_names
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
            bytes_per_consumer: consumer_names.iter().map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Set the workload size (from discovery totals or a synthetic workload).
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.total_files.store(files, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_produced(&self, delta: u64) {
        self.bytes_produced.fetch_add(delta, Ordering::Relaxed);
    }

    /// Credit `delta` bytes to consumer `kind` (index in registration order). Unknown kinds are ignored.
    pub fn add_bytes_read(&self, kind: usize, delta: u64) {
        if let Some(c) = self.bytes_per_consumer.get(kind) {
            c.fetch_add(delta, Ordering::Relaxed);
        }
    }

    pub fn file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_files: self.total_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            bytes_produced: self.bytes_produced.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes_per_consumer: self
                .consumer_names
                .iter()
                .zip(&self.bytes_per_consumer)
                .map(|(n, c)| (n.clone(), c.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a byte-scaled progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> Bar {
    kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = "B",
        unit_scale = true
    )
}

/// Move the bar to `n` and refresh the postfix. Terminal write errors are ignored.
fn update_bar_to(bar: &mut Bar, n: usize, postfix: String) {
    bar.set_postfix(postfix);
    let _ = bar.update_to(n);
}

fn files_postfix(s: &ProgressSnapshot) -> String {
    let mut postfix = format!("{}/{} files", s.files_completed, s.total_files);
    if s.files_failed > 0 {
        postfix.push_str(&format!(", {} failed", s.files_failed));
    }
    postfix
}

/// Display thread polling a [`ProgressCounters`]. Stop it with [`ProgressDisplay::finish`].
pub struct ProgressDisplay {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    pub fn spawn(counters: Arc<ProgressCounters>) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let initial = counters.snapshot();
            let mut bar = create_progress_bar(ProgressBarConfig::new(
                initial.total_bytes as usize,
                "Hashing",
                Animation::Classic,
            ));
            // The stop channel doubles as the refresh ticker.
            while stop_rx
                .recv_timeout(ProgressConsts::REFRESH_INTERVAL)
                .is_err_and(|e| e.is_timeout())
            {
                let s = counters.snapshot();
                update_bar_to(&mut bar, s.bytes_consumed() as usize, files_postfix(&s));
            }
            let s = counters.snapshot();
            update_bar_to(&mut bar, s.bytes_consumed() as usize, files_postfix(&s));
            eprintln!();
        });
        Self { stop_tx, handle }
    }

    /// Draw the final state and join the display thread.
    pub fn finish(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
    }
}
