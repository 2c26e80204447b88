//! Append-only JSON Lines log of completed downloads.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::config::app_config_dir;

/// Number of records shown by `--history`.
pub(crate) const RECENT_LIMIT: usize = 20;

const HISTORY_FILE: &str = "history.jsonl";

/// One completed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HistoryRecord {
    pub(crate) file_name: String,
    pub(crate) path: PathBuf,
    pub(crate) size_bytes: u64,
    pub(crate) completed_at_unix: u64,
}

impl HistoryRecord {
    pub(crate) fn now(file_name: impl Into<String>, path: PathBuf, size_bytes: u64) -> Self {
        let completed_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            file_name: file_name.into(),
            path,
            size_bytes,
            completed_at_unix,
        }
    }
}

pub(crate) fn default_history_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join(HISTORY_FILE))
}

/// Appends records, creating the file and its directory as needed.
pub(crate) fn append_records(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create history directory '{}'", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open history file '{}'", path.display()))?;

    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&serde_json::to_string(record)?);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())
        .with_context(|| format!("Failed to write history file '{}'", path.display()))?;
    debug!(count = records.len(), path = %path.display(), "history appended");
    Ok(())
}

/// Reads the last `limit` records, oldest first. Unparseable lines are skipped.
pub(crate) fn read_recent(path: &Path, limit: usize) -> Result<Vec<HistoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file '{}'", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = index + 1, error = %e, "skipping malformed history line"),
        }
    }
    let skip = records.len().saturating_sub(limit);
    Ok(records.split_off(skip))
}
