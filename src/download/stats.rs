//! Run-wide counters shared by the dispatcher, the filter stage and workers.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Atomic totals for one run.
///
/// Shared behind an `Arc`; every counter is updated with `SeqCst` so a
/// [`snapshot`](Self::snapshot) taken after all workers finished is exact.
#[derive(Debug)]
pub struct AggregateStats {
    started: Instant,
    discovered: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    filtered: AtomicUsize,
    retried: AtomicUsize,
    bytes_transferred: AtomicU64,
    known_total_bytes: AtomicU64,
    interrupted: AtomicBool,
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            discovered: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            filtered: AtomicUsize::new(0),
            retried: AtomicUsize::new(0),
            bytes_transferred: AtomicU64::new(0),
            known_total_bytes: AtomicU64::new(0),
            interrupted: AtomicBool::new(false),
        }
    }
}

impl AggregateStats {
    /// Creates zeroed stats; elapsed time counts from now.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry reached the executor.
    pub fn record_discovered(&self, size_bytes: Option<u64>) {
        self.discovered.fetch_add(1, Ordering::SeqCst);
        if let Some(size) = size_bytes {
            self.known_total_bytes.fetch_add(size, Ordering::SeqCst);
        }
    }

    /// An entry was transferred and placed.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// An entry was already present.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// An entry failed terminally.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// An entry was removed by the filter before scheduling.
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::SeqCst);
    }

    /// A retry was scheduled.
    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Body bytes arrived.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::SeqCst);
    }

    /// The run stopped taking new work because of cancellation.
    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Completed count so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Failed count so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Plain copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            discovered: self.discovered.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            filtered: self.filtered.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            bytes_transferred: self.bytes_transferred.load(Ordering::SeqCst),
            known_total_bytes: self.known_total_bytes.load(Ordering::SeqCst),
            elapsed: self.started.elapsed(),
            interrupted: self.interrupted.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of [`AggregateStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Entries that reached the executor.
    pub discovered: usize,
    /// Transferred and placed.
    pub completed: usize,
    /// Already present.
    pub skipped: usize,
    /// Failed terminally.
    pub failed: usize,
    /// Removed by the filter.
    pub filtered: usize,
    /// Retries scheduled.
    pub retried: usize,
    /// Body bytes received, including abandoned attempts.
    pub bytes_transferred: u64,
    /// Sum of published sizes of discovered entries.
    pub known_total_bytes: u64,
    /// Time since the stats were created.
    pub elapsed: Duration,
    /// Cancellation stopped the run early.
    pub interrupted: bool,
}

impl StatsSnapshot {
    /// Entries found by the manifest source, filtered or not.
    #[must_use]
    pub fn found(&self) -> usize {
        self.discovered + self.filtered
    }

    /// Entries that reached a terminal outcome.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}
