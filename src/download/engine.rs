//! Bounded-concurrency executor for manifest entries.
//!
//! The [`DownloadExecutor`] consumes a manifest channel, running each entry in
//! its own Tokio task under a semaphore permit. Entries are resolved lazily,
//! verified, streamed into a temporary file and renamed into place; transient
//! failures retry with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use mfbulk_core::download::{DownloadExecutor, ExecutorConfig};
//! use mfbulk_core::fetch::Fetcher;
//! use mfbulk_core::manifest::ManifestEntry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = DownloadExecutor::new(Fetcher::new()?, ExecutorConfig::default())?;
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! tx.send(ManifestEntry::new(0, "abc123", "a.zip", "a.zip", "https://www.mediafire.com/file/abc123/file")).await?;
//! drop(tx);
//! let stats = executor
//!     .execute(rx, Path::new("./downloads"), Arc::new(AtomicBool::new(false)))
//!     .await?;
//! println!("completed {}, failed {}", stats.completed, stats.failed);
//! # Ok(())
//! # }
//! ```

mod task;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::events::{Discovered, EngineEvent, EventSender, emit};
use super::retry::RetryPolicy;
use super::stats::{AggregateStats, StatsSnapshot};
use crate::fetch::Fetcher;
use crate::manifest::ManifestEntry;
use task::{TaskContext, process_entry};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Time in-flight tasks get to finish after cancellation before being aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Poll interval for the cancellation flag.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Fatal executor errors. Per-entry failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Worker slots (1..=100).
    pub concurrency: usize,
    /// Per-entry retry policy.
    pub retry_policy: RetryPolicy,
    /// Cancel the run on the first terminal failure.
    pub fail_fast: bool,
    /// Wait for in-flight tasks after cancellation.
    pub grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            fail_fast: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Concurrent download executor.
///
/// # Concurrency Model
///
/// - Each entry runs in its own Tokio task
/// - A semaphore permit is acquired before spawning (RAII release)
/// - Waiting for the next entry and for a permit both race the cancel flag
/// - After cancellation, in-flight tasks get a grace period and are then
///   aborted; their temporary files are removed on drop
#[derive(Debug)]
pub struct DownloadExecutor {
    semaphore: Arc<Semaphore>,
    fetcher: Fetcher,
    config: ExecutorConfig,
    stats: Arc<AggregateStats>,
    events: Option<EventSender>,
}

impl DownloadExecutor {
    /// Creates an executor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// 1..=100.
    #[instrument(level = "debug", skip(fetcher, config), fields(concurrency = config.concurrency))]
    pub fn new(fetcher: Fetcher, config: ExecutorConfig) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }

        debug!(
            max_retries = config.retry_policy.max_attempts(),
            fail_fast = config.fail_fast,
            "creating download executor"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            fetcher,
            config,
            stats: Arc::new(AggregateStats::new()),
            events: None,
        })
    }

    /// Sends progress events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Records into shared stats instead of private ones.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<AggregateStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<AggregateStats> {
        Arc::clone(&self.stats)
    }

    /// Processes entries from `manifest` until it closes or `cancel` is set.
    ///
    /// Individual download failures do NOT cause this method to error; they
    /// are counted in the returned snapshot. Dropping the receiver on return
    /// tells the producer to stop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, manifest, cancel), fields(root = %root.display()))]
    pub async fn execute(
        &self,
        mut manifest: mpsc::Receiver<ManifestEntry>,
        root: &Path,
        cancel: Arc<AtomicBool>,
    ) -> Result<StatsSnapshot, EngineError> {
        let ctx = Arc::new(TaskContext {
            fetcher: self.fetcher.clone(),
            root: root.to_path_buf(),
            retry_policy: self.config.retry_policy.clone(),
            stats: Arc::clone(&self.stats),
            events: self.events.clone(),
            fail_fast: self.config.fail_fast,
            cancel: Arc::clone(&cancel),
        });
        let mut handles: Vec<(u64, JoinHandle<()>)> = Vec::new();

        info!(concurrency = self.config.concurrency, "starting downloads");

        loop {
            if cancel.load(Ordering::SeqCst) {
                self.stats.mark_interrupted();
                break;
            }
            drain_finished(&mut handles, &self.stats).await;

            let next = tokio::select! {
                biased;
                () = wait_for_cancel(&cancel) => {
                    self.stats.mark_interrupted();
                    break;
                }
                next = manifest.recv() => next,
            };
            let Some(entry) = next else {
                break; // Producer finished
            };

            debug!(entry_id = entry.id, path = %entry.relative_path.display(), "dequeued entry");
            self.stats.record_discovered(entry.size_bytes);
            emit(
                self.events.as_ref(),
                EngineEvent::Discovered(Discovered {
                    entry_id: entry.id,
                    display_name: entry.display_name.clone(),
                    total_bytes: entry.size_bytes,
                }),
            );

            // Race the permit wait against cancellation so Ctrl+C during a
            // full-concurrency wait breaks immediately.
            let permit = tokio::select! {
                biased;
                () = wait_for_cancel(&cancel) => {
                    self.stats.mark_interrupted();
                    None
                }
                result = Arc::clone(&self.semaphore).acquire_owned() => {
                    Some(result.map_err(|_| EngineError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                break;
            };

            let ctx = Arc::clone(&ctx);
            let entry_id = entry.id;
            handles.push((
                entry_id,
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    process_entry(ctx, entry).await;
                }),
            ));
        }
        drop(manifest);

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        if cancel.load(Ordering::SeqCst) {
            self.stats.mark_interrupted();
            let deadline = tokio::time::Instant::now() + self.config.grace_period;
            for (id, mut handle) in handles {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    handle.abort();
                    continue;
                }
                match tokio::time::timeout(deadline - now, &mut handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => handle_join_error(id, &e, &self.stats),
                    Err(_) => {
                        debug!(entry_id = id, "grace period over, aborting task");
                        handle.abort();
                    }
                }
            }
        } else {
            for (id, handle) in handles {
                if let Err(e) = handle.await {
                    handle_join_error(id, &e, &self.stats);
                }
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            completed = snapshot.completed,
            skipped = snapshot.skipped,
            failed = snapshot.failed,
            retried = snapshot.retried,
            interrupted = snapshot.interrupted,
            "downloads finished"
        );
        Ok(snapshot)
    }
}

async fn wait_for_cancel(cancel: &AtomicBool) {
    while !cancel.load(Ordering::SeqCst) {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

/// Joins tasks that already finished so panics surface promptly.
async fn drain_finished(handles: &mut Vec<(u64, JoinHandle<()>)>, stats: &AggregateStats) {
    let mut index = 0;
    while index < handles.len() {
        if handles[index].1.is_finished() {
            let (id, handle) = handles.swap_remove(index);
            if let Err(e) = handle.await {
                handle_join_error(id, &e, stats);
            }
        } else {
            index += 1;
        }
    }
}

fn handle_join_error(entry_id: u64, error: &tokio::task::JoinError, stats: &AggregateStats) {
    if error.is_cancelled() {
        debug!(entry_id, "download task cancelled");
        return;
    }
    warn!(entry_id, error = %error, "download task panicked");
    stats.record_failed();
}
