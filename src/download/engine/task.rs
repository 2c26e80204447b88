//! Per-entry pipeline run inside a worker task.
//!
//! Order matters: the existence check is purely local and happens before any
//! request, so a re-run over a complete directory never touches the network.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::File;
use tracing::{debug, info, instrument, warn};

use crate::download::events::{EngineEvent, EventSender, ProgressEvent, emit};
use crate::download::integrity::sha256_file;
use crate::download::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_delay,
};
use crate::download::stats::AggregateStats;
use crate::error::{DownloadError, FilesystemError, IntegrityError};
use crate::extract::extract;
use crate::fetch::{Fetcher, StreamedBody};
use crate::manifest::{DownloadResult, EntryState, ManifestEntry, SkipReason};

/// Minimum byte advance between two progress events for one entry.
const PROGRESS_EVENT_STEP: u64 = 256 * 1024;

/// Shared, read-only inputs for every worker of one run.
#[derive(Debug)]
pub(crate) struct TaskContext {
    pub fetcher: Fetcher,
    pub root: PathBuf,
    pub retry_policy: RetryPolicy,
    pub stats: Arc<AggregateStats>,
    pub events: Option<EventSender>,
    pub fail_fast: bool,
    pub cancel: Arc<AtomicBool>,
}

/// Runs one entry to a terminal outcome and records it.
#[instrument(skip(ctx, entry), fields(entry_id = entry.id, path = %entry.relative_path.display()))]
pub(crate) async fn process_entry(ctx: Arc<TaskContext>, mut entry: ManifestEntry) -> DownloadResult {
    let result = run_pipeline(&ctx, &mut entry).await;

    match &result {
        DownloadResult::Completed { bytes_written } => {
            info!(bytes = bytes_written, "download completed");
            ctx.stats.record_completed();
        }
        DownloadResult::Skipped(reason) => {
            info!(%reason, "skipped");
            ctx.stats.record_skipped();
        }
        DownloadResult::Failed(error) => {
            warn!(kind = error.kind_label(), error = %error, "download failed");
            ctx.stats.record_failed();
            if ctx.fail_fast {
                ctx.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    let bytes = match &result {
        DownloadResult::Completed { bytes_written } => *bytes_written,
        _ => 0,
    };
    entry.state = EntryState::Finished(result.clone());
    emit(
        ctx.events.as_ref(),
        EngineEvent::Progress(ProgressEvent::for_entry(&entry, bytes, entry.state.clone())),
    );
    result
}

async fn run_pipeline(ctx: &TaskContext, entry: &mut ManifestEntry) -> DownloadResult {
    let final_path = match join_under_root(&ctx.root, &entry.relative_path) {
        Ok(path) => path,
        Err(e) => return DownloadResult::Failed(e.into()),
    };

    if let Some(parent) = final_path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        return DownloadResult::Failed(FilesystemError::from_io(parent, &e).into());
    }

    match existing_matches(entry, &final_path).await {
        Ok(true) => return DownloadResult::Skipped(SkipReason::AlreadyExists),
        Ok(false) => {}
        Err(e) => return DownloadResult::Failed(e.into()),
    }

    match download_with_retry(ctx, entry, &final_path).await {
        Ok(bytes_written) => DownloadResult::Completed { bytes_written },
        Err(e) => DownloadResult::Failed(e),
    }
}

/// Joins `relative` onto `root`, refusing anything but plain components.
fn join_under_root(root: &Path, relative: &Path) -> Result<PathBuf, FilesystemError> {
    let safe = relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(root.join(relative))
    } else {
        Err(FilesystemError::Other {
            path: relative.to_path_buf(),
            message: "relative path escapes the destination root".to_string(),
        })
    }
}

/// Size first; hash only when sizes agree and a digest is published.
/// With neither size nor hash the file is fetched again.
async fn existing_matches(entry: &ManifestEntry, path: &Path) -> Result<bool, FilesystemError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(FilesystemError::from_io(path, &e)),
    };
    if !metadata.is_file() {
        return Ok(false);
    }

    if let Some(expected) = entry.size_bytes
        && metadata.len() != expected
    {
        debug!(local = metadata.len(), expected, "existing file has different size");
        return Ok(false);
    }

    match (&entry.expected_hash, entry.size_bytes) {
        (Some(expected), _) => {
            let actual = sha256_file(path).await?;
            let same = &actual == expected;
            if !same {
                debug!(%expected, %actual, "existing file has different hash");
            }
            Ok(same)
        }
        (None, Some(_)) => Ok(true),
        (None, None) => Ok(false),
    }
}

/// Downloads with retry for transient errors.
///
/// A fresh direct URL is resolved after network and integrity failures since
/// direct links are short-lived.
async fn download_with_retry(
    ctx: &TaskContext,
    entry: &mut ManifestEntry,
    final_path: &Path,
) -> Result<u64, DownloadError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting download");

        match attempt_download(ctx, entry, final_path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                let failure_type = classify_error(&e);
                match ctx.retry_policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay: backoff_delay,
                        attempt: next_attempt,
                    } => {
                        let retry_after = if failure_type == FailureType::RateLimited {
                            retry_after_delay(&e)
                        } else {
                            None
                        };
                        let delay = retry_after.unwrap_or(backoff_delay);

                        info!(
                            attempt = next_attempt,
                            max_attempts = ctx.retry_policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            using_retry_after = retry_after.is_some(),
                            error = %e,
                            "retrying download"
                        );
                        ctx.stats.record_retry();
                        if matches!(e, DownloadError::Network(_) | DownloadError::Integrity(_)) {
                            entry.direct_url = None;
                        }
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(%reason, attempts = attempt, "not retrying download");
                        return Err(e);
                    }
                }
            }
        }
    }
}

async fn attempt_download(
    ctx: &TaskContext,
    entry: &mut ManifestEntry,
    final_path: &Path,
) -> Result<u64, DownloadError> {
    let direct_url = match &entry.direct_url {
        Some(url) => url.clone(),
        None => {
            entry.state = EntryState::Resolving;
            emit(
                ctx.events.as_ref(),
                EngineEvent::Progress(ProgressEvent::for_entry(entry, 0, EntryState::Resolving)),
            );
            let page = ctx.fetcher.get_text(&entry.share_url).await?;
            let found = extract(&page)?;
            debug!(strategy = %found.strategy, url = %found.url, "resolved direct url");
            entry.direct_url = Some(found.url.clone());
            found.url
        }
    };

    entry.state = EntryState::Downloading;
    emit(
        ctx.events.as_ref(),
        EngineEvent::Progress(ProgressEvent::for_entry(entry, 0, EntryState::Downloading)),
    );

    let dir = final_path.parent().unwrap_or(ctx.root.as_path());
    let file_name = final_path
        .file_name()
        .map_or_else(|| "download".into(), |n| n.to_string_lossy());
    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| FilesystemError::from_io(dir, &e))?;
    let handle = temp
        .reopen()
        .map_err(|e| FilesystemError::from_io(temp.path(), &e))?;

    let mut last_reported = 0u64;
    let mut last_emitted = 0u64;
    let stats = &ctx.stats;
    let events = ctx.events.as_ref();
    let snapshot = entry.clone();
    let body = ctx
        .fetcher
        .stream_to_file(&direct_url, File::from_std(handle), temp.path(), |so_far| {
            stats.add_bytes(so_far - last_reported);
            last_reported = so_far;
            if so_far - last_emitted >= PROGRESS_EVENT_STEP {
                last_emitted = so_far;
                emit(
                    events,
                    EngineEvent::Progress(ProgressEvent::for_entry(
                        &snapshot,
                        so_far,
                        EntryState::Downloading,
                    )),
                );
            }
        })
        .await?;

    verify(entry, &body, final_path)?;

    temp.persist(final_path)
        .map_err(|e| FilesystemError::from_io(final_path, &e.error))?;
    Ok(body.bytes_written)
}

fn verify(entry: &ManifestEntry, body: &StreamedBody, path: &Path) -> Result<(), IntegrityError> {
    let expected_size = entry.size_bytes.or(body.content_length);
    match expected_size {
        Some(expected) if body.bytes_written != expected => {
            return Err(IntegrityError::SizeMismatch {
                path: path.to_path_buf(),
                expected: Some(expected),
                actual: body.bytes_written,
            });
        }
        None if body.bytes_written == 0 => {
            return Err(IntegrityError::SizeMismatch {
                path: path.to_path_buf(),
                expected: None,
                actual: 0,
            });
        }
        _ => {}
    }

    if let Some(expected) = &entry.expected_hash
        && &body.sha256 != expected
    {
        return Err(IntegrityError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.clone(),
            actual: body.sha256.clone(),
        });
    }
    Ok(())
}
