//! Manifest entries and per-entry outcomes.

use std::fmt;
use std::path::PathBuf;

use crate::error::DownloadError;

/// One downloadable file discovered from a share link.
///
/// Entries are owned by exactly one stage at a time: the producer that
/// discovers them, the manifest channel, then the worker processing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Sequential id in discovery order, unique within a run.
    pub id: u64,
    /// Remote quick key.
    pub remote_id: String,
    /// File name as published by the remote (unsanitized).
    pub display_name: String,
    /// Path under the destination root, built from sanitized components.
    pub relative_path: PathBuf,
    /// Human-facing share page for the file.
    pub share_url: String,
    /// Byte-serving URL, filled in lazily by the executor.
    pub direct_url: Option<String>,
    /// Size published by the remote, when known.
    pub size_bytes: Option<u64>,
    /// Lowercase hex SHA-256 published by the remote, when known.
    pub expected_hash: Option<String>,
    /// Processing state.
    pub state: EntryState,
}

impl ManifestEntry {
    /// Creates a queued entry with unknown direct URL.
    #[must_use]
    pub fn new(
        id: u64,
        remote_id: impl Into<String>,
        display_name: impl Into<String>,
        relative_path: impl Into<PathBuf>,
        share_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            remote_id: remote_id.into(),
            display_name: display_name.into(),
            relative_path: relative_path.into(),
            share_url: share_url.into(),
            direct_url: None,
            size_bytes: None,
            expected_hash: None,
            state: EntryState::Queued,
        }
    }

    /// Sets the published size.
    #[must_use]
    pub fn with_size(mut self, size_bytes: Option<u64>) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Sets the published hash; blank values are treated as unknown.
    #[must_use]
    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.expected_hash = hash
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty());
        self
    }

    /// Sets an already known direct URL.
    #[must_use]
    pub fn with_direct_url(mut self, url: impl Into<String>) -> Self {
        self.direct_url = Some(url.into());
        self
    }
}

/// Why an entry was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A verified copy is already at the destination path.
    AlreadyExists,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("already exists"),
        }
    }
}

/// Terminal outcome of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// Body transferred, verified and moved into place.
    Completed {
        /// Bytes written to disk.
        bytes_written: u64,
    },
    /// Nothing transferred.
    Skipped(SkipReason),
    /// Gave up on the entry.
    Failed(DownloadError),
}

/// Lifecycle of an entry as seen by the progress consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting in the manifest channel.
    Queued,
    /// Fetching the share page and extracting the direct URL.
    Resolving,
    /// Streaming the body.
    Downloading,
    /// Done, one way or another.
    Finished(DownloadResult),
}

impl EntryState {
    /// True once the entry reached a terminal outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_queued_without_direct_url() {
        let entry = ManifestEntry::new(1, "k1", "a.zip", "Root/a.zip", "https://x/file/k1");
        assert_eq!(entry.state, EntryState::Queued);
        assert!(entry.direct_url.is_none());
        assert!(!entry.state.is_finished());
    }

    #[test]
    fn test_with_hash_normalizes_and_drops_blank() {
        let entry = ManifestEntry::new(1, "k", "a", "a", "u").with_hash(Some(" ABCDEF ".into()));
        assert_eq!(entry.expected_hash.as_deref(), Some("abcdef"));

        let entry = ManifestEntry::new(1, "k", "a", "a", "u").with_hash(Some(String::new()));
        assert!(entry.expected_hash.is_none());
    }

    #[test]
    fn test_finished_state() {
        let state = EntryState::Finished(DownloadResult::Skipped(SkipReason::AlreadyExists));
        assert!(state.is_finished());
        assert_eq!(SkipReason::AlreadyExists.to_string(), "already exists");
    }
}
