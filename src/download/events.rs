//! Events emitted by the executor for a single progress consumer.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::manifest::{EntryState, ManifestEntry};

/// Sender half handed to the executor.
pub type EventSender = UnboundedSender<EngineEvent>;

/// Everything the executor reports while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// An entry was accepted for scheduling.
    Discovered(Discovered),
    /// An entry changed state or moved bytes.
    Progress(ProgressEvent),
}

/// Notice that an entry entered the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Manifest id.
    pub entry_id: u64,
    /// Remote file name.
    pub display_name: String,
    /// Published size, when known.
    pub total_bytes: Option<u64>,
}

/// Per-entry progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Manifest id.
    pub entry_id: u64,
    /// Remote file name.
    pub display_name: String,
    /// Path under the destination root.
    pub relative_path: PathBuf,
    /// Bytes received so far for the current attempt.
    pub bytes_so_far: u64,
    /// Expected size, when known.
    pub total_bytes: Option<u64>,
    /// State at the time of the event.
    pub state: EntryState,
}

impl ProgressEvent {
    pub(crate) fn for_entry(entry: &ManifestEntry, bytes_so_far: u64, state: EntryState) -> Self {
        Self {
            entry_id: entry.id,
            display_name: entry.display_name.clone(),
            relative_path: entry.relative_path.clone(),
            bytes_so_far,
            total_bytes: entry.size_bytes,
            state,
        }
    }
}

/// Sends to an optional channel, ignoring a departed consumer.
pub(crate) fn emit(events: Option<&EventSender>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
