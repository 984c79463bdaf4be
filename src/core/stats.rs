//! Scheduler statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Configured maximum number of concurrent workers.
    pub max_concurrency: usize,
    /// Workers currently running a task.
    pub running: usize,
    /// Tasks waiting in the queue (including cancelled ones not yet popped).
    pub queued: usize,
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks whose payload finished successfully.
    pub completed: u64,
    /// Tasks whose payload failed or panicked.
    pub failed: u64,
    /// Successful cancellations.
    pub cancelled: u64,
    /// Tasks discarded by `release_all`.
    pub discarded: u64,
    /// Tasks expired by their queue timeout.
    pub expired: u64,
    /// Submissions refused (stopped scheduler or full queue).
    pub rejected: u64,
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub discarded: AtomicU64,
    pub expired: AtomicU64,
    pub rejected: AtomicU64,
}

impl SchedulerCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, max_concurrency: usize, running: usize, queued: usize) -> SchedulerStats {
        SchedulerStats {
            max_concurrency,
            running,
            queued,
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
