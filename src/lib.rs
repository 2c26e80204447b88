//! mfbulk Core Library
//!
//! Resolves MediaFire share links into direct download URLs, expands folder
//! links into a flat manifest, and downloads the result concurrently with
//! skip-if-present semantics.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`share`] - Share link classification
//! - [`fetch`] - HTTP client wrapper (pages, API calls, streamed bodies)
//! - [`remote`] - Typed access to the hosting service's JSON API
//! - [`extract`] - Direct link extraction from share pages
//! - [`walker`] - Breadth-first folder walk producing manifest entries
//! - [`filter`] - Extension and filename denylists
//! - [`download`] - Bounded-concurrency download executor
//! - [`destination`] - Output root resolution
//! - [`run`] - Wiring for a single invocation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod destination;
pub mod download;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod manifest;
pub mod remote;
pub mod run;
pub mod share;
pub mod walker;

mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use destination::{FOLDER_DEFAULT_DIR, resolve_destination};
pub use download::{
    AggregateStats, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, Discovered, DownloadExecutor,
    EngineError, EngineEvent, EventSender, ExecutorConfig, ProgressEvent, RetryPolicy,
    StatsSnapshot,
};
pub use error::{
    ConfigError, DownloadError, ExtractError, FilesystemError, IntegrityError, NetworkError,
    RemoteError,
};
pub use extract::{ExtractStrategy, Extracted, extract};
pub use fetch::Fetcher;
pub use filter::FilterRules;
pub use manifest::{DownloadResult, EntryState, ManifestEntry, SkipReason};
pub use remote::MediaFireApi;
pub use run::{ManifestPreview, RunError, RunOutcome, RunRequest, plan, run};
pub use share::{ShareKind, ShareLink};
pub use walker::{BranchFailure, DEFAULT_LISTING_CONCURRENCY, FolderWalker, WalkReport, WalkerConfig};
