//! Download executor: bounded concurrency, verification and retry.
//!
//! Entries arrive over a channel from the manifest producer. Each one is
//! checked against the destination first, resolved to a direct URL only when
//! a transfer is needed, streamed to a temporary file and renamed into place
//! once its size and hash check out.
//!
//! # Features
//!
//! - Skip-if-exists by size and SHA-256
//! - Temporary file plus atomic rename, no partial files at final paths
//! - Exponential backoff with jitter, honoring `Retry-After`
//! - Cooperative cancellation with a grace period

mod engine;
mod events;
mod integrity;
mod retry;
mod stats;

pub use engine::{
    DEFAULT_CONCURRENCY, DEFAULT_GRACE_PERIOD, DownloadExecutor, EngineError, ExecutorConfig,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use events::{Discovered, EngineEvent, EventSender, ProgressEvent};
pub use integrity::sha256_file;
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_http_status, classify_remote_error, parse_retry_after,
};
pub use stats::{AggregateStats, StatsSnapshot};

// Note: no module-local Result aliases. Use `Result<T, DownloadError>` explicitly.
