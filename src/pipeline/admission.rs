//! Two-level admission control: one global permit pool plus one permit pool per partition.
//!
//! Every pending file sits in the FIFO queue of the partition that owns it. [`AdmissionController::acquire_next`]
//! waits until some partition with queued work has a free local permit *and* a global permit is
//! free, then claims both and dequeues that partition's next file. The set of candidate partitions
//! is re-evaluated under the lock on every wake-up, so partitions drop out of the race as their
//! queues drain. Releases happen only through [`AdmissionSlot`]'s `Drop`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::PendingFile;
use crate::utils::CancelToken;
use crate::utils::config::CANCEL_POLL_INTERVAL;

use super::partition::PartitionSet;

struct PartitionState {
    prefix: String,
    limit: usize,
    in_use: usize,
    queue: VecDeque<PendingFile>,
}

struct AdmissionState {
    global_in_use: usize,
    partitions: Vec<PartitionState>,
    /// Round-robin start for the next scan so one busy partition cannot starve the rest.
    cursor: usize,
    closed: bool,
}

impl AdmissionState {
    fn has_pending(&self) -> bool {
        self.partitions.iter().any(|p| !p.queue.is_empty())
    }

    fn ready_partition(&self) -> Option<usize> {
        let n = self.partitions.len();
        (0..n)
            .map(|k| (self.cursor + k) % n)
            .find(|&i| {
                let p = &self.partitions[i];
                !p.queue.is_empty() && p.in_use < p.limit
            })
    }
}

/// Result of one [`AdmissionController::acquire_next`] call.
pub enum Acquire {
    /// Both permits held; the file was dequeued from the slot's partition.
    Admitted(AdmissionSlot, PendingFile),
    /// No queued files remain in any partition.
    Exhausted,
    /// The cancel token fired or the controller was closed while waiting.
    Cancelled,
}

/// Usage of one partition at the instant [`AdmissionController::stats`] was taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionUsage {
    pub prefix: String,
    pub limit: usize,
    pub in_use: usize,
    pub queued: usize,
}

/// Consistent snapshot of every permit pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionStats {
    pub global_limit: usize,
    pub global_in_use: usize,
    /// Declared partitions in declaration order, catch-all last.
    pub partitions: Vec<PartitionUsage>,
}

impl AdmissionStats {
    pub fn queued(&self) -> usize {
        self.partitions.iter().map(|p| p.queued).sum()
    }

    pub fn permits_in_use(&self) -> usize {
        self.global_in_use
    }
}

pub struct AdmissionController {
    set: PartitionSet,
    state: Mutex<AdmissionState>,
    released: Condvar,
}

impl AdmissionController {
    pub fn new(set: &PartitionSet) -> Self {
        debug_assert!(
            set.global_limit > 0 && set.partitions.iter().all(|p| p.concurrency_limit > 0),
            "zero concurrency limit in {set}"
        );
        let partitions = (0..set.len_with_catch_all())
            .map(|i| {
                let (prefix, limit) = set.describe(i);
                PartitionState {
                    prefix: prefix.to_string(),
                    limit,
                    in_use: 0,
                    queue: VecDeque::new(),
                }
            })
            .collect();
        Self {
            set: set.clone(),
            state: Mutex::new(AdmissionState {
                global_in_use: 0,
                partitions,
                cursor: 0,
                closed: false,
            }),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // Counters stay consistent even if a holder panicked: every mutation is a single step.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.set
    }

    /// Queue `file` on the partition owning its path. Returns the partition index.
    pub fn enqueue(&self, file: PendingFile) -> usize {
        let index = self.set.partition_index(&file.path.to_string_lossy());
        let mut state = self.lock();
        state.partitions[index].queue.push_back(file);
        drop(state);
        self.released.notify_all();
        index
    }

    pub fn has_pending(&self) -> bool {
        self.lock().has_pending()
    }

    /// Wait for a global and a local permit, then dequeue the next file of the partition that
    /// became ready. Returns [`Acquire::Exhausted`] once every queue is empty.
    pub fn acquire_next(self: &Arc<Self>, cancel: &CancelToken) -> Acquire {
        let mut state = self.lock();
        loop {
            if state.closed || cancel.is_cancelled() {
                return Acquire::Cancelled;
            }
            if !state.has_pending() {
                return Acquire::Exhausted;
            }
            if state.global_in_use < self.set.global_limit
                && let Some(index) = state.ready_partition()
            {
                let partition = &mut state.partitions[index];
                let Some(file) = partition.queue.pop_front() else {
                    continue;
                };
                partition.in_use += 1;
                state.global_in_use += 1;
                state.cursor = (index + 1) % state.partitions.len();
                return Acquire::Admitted(
                    AdmissionSlot {
                        controller: Arc::clone(self),
                        partition: index,
                    },
                    file,
                );
            }
            state = match self.released.wait_timeout(state, CANCEL_POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Fail every outstanding and future wait with [`Acquire::Cancelled`]. Held slots still release normally.
    pub fn close(&self) {
        self.lock().closed = true;
        self.released.notify_all();
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.lock();
        AdmissionStats {
            global_limit: self.set.global_limit,
            global_in_use: state.global_in_use,
            partitions: state
                .partitions
                .iter()
                .map(|p| PartitionUsage {
                    prefix: p.prefix.clone(),
                    limit: p.limit,
                    in_use: p.in_use,
                    queued: p.queue.len(),
                })
                .collect(),
        }
    }

    fn release(&self, partition: usize) {
        let mut state = self.lock();
        let p = &mut state.partitions[partition];
        debug_assert!(p.in_use > 0, "partition permit released twice");
        p.in_use = p.in_use.saturating_sub(1);
        state.global_in_use = state.global_in_use.saturating_sub(1);
        drop(state);
        self.released.notify_all();
    }
}

/// A held global permit plus one partition permit. Both are returned exactly once, on drop.
pub struct AdmissionSlot {
    controller: Arc<AdmissionController>,
    partition: usize,
}

impl AdmissionSlot {
    /// Index of the partition whose local permit this slot holds (catch-all is last).
    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn partition_prefix(&self) -> &str {
        self.controller.set.describe(self.partition).0
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.controller.release(self.partition);
    }
}

impl std::fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot")
            .field("partition", &self.partition)
            .finish()
    }
}
