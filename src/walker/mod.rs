//! Folder tree traversal into a flat download manifest.
//!
//! [`FolderWalker`] walks a remote folder breadth-first with an explicit
//! frontier. Each level's folders are listed with a bounded, order-preserving
//! fan-out, so the emitted manifest order depends only on the listing
//! snapshot:
//!
//! - folders by level, then in listing order
//! - files before sub-folders within a folder
//! - API `order_by=name` ordering within a listing
//!
//! All de-duplication happens in the single walk loop: visited folder keys
//! are skipped, repeated quick keys are dropped, and colliding relative paths
//! receive `_2`, `_3`, ... suffixes through [`PathRegistry`].
//!
//! A sub-folder that cannot be listed becomes a [`BranchFailure`] in the
//! [`WalkReport`]; its siblings are still walked.

mod path;

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::download::{RetryDecision, RetryPolicy, classify_remote_error};
use crate::error::RemoteError;
use crate::manifest::ManifestEntry;
use crate::remote::{Chunk, FolderInfo, MediaFireApi, RemoteFile, RemoteFolder};

pub use path::{PathRegistry, sanitize_component};

/// Default number of folders listed concurrently.
pub const DEFAULT_LISTING_CONCURRENCY: usize = 4;

/// Pages fetched per listing before giving up on a server that never stops.
const MAX_CHUNKS_PER_LISTING: u32 = 10_000;

/// Tuning for a walk.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Folders listed in parallel within one level.
    pub listing_concurrency: usize,
    /// Retry policy for individual API calls.
    pub retry_policy: RetryPolicy,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// A folder that could not be (fully) listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    /// Remote key of the folder.
    pub folder_key: String,
    /// Relative path the folder would have occupied.
    pub path: PathBuf,
    /// What went wrong.
    pub error: RemoteError,
}

/// Summary of a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Folders whose listing was attempted.
    pub folders_listed: usize,
    /// Entries sent to the sink.
    pub entries_emitted: u64,
    /// Sub-folders skipped because their key was already visited.
    pub cycles_skipped: usize,
    /// Files skipped because their quick key was already emitted.
    pub duplicates_skipped: usize,
    /// Branches that failed to list.
    pub failures: Vec<BranchFailure>,
    /// The sink was closed before the walk finished.
    pub stopped_early: bool,
}

#[derive(Debug)]
struct PendingFolder {
    key: String,
    path: PathBuf,
}

#[derive(Debug, Default)]
struct FolderListing {
    files: Vec<RemoteFile>,
    folders: Vec<RemoteFolder>,
    failure: Option<RemoteError>,
}

/// Breadth-first walker over a remote folder tree.
///
/// Finite and not restartable: [`walk`](Self::walk) consumes the walker.
#[derive(Debug)]
pub struct FolderWalker {
    api: MediaFireApi,
    config: WalkerConfig,
    root: FolderInfo,
}

impl FolderWalker {
    /// Looks up the root folder so a bad link fails before any download.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the root folder info cannot be fetched.
    #[instrument(skip(api, config))]
    pub async fn open(
        api: MediaFireApi,
        root_key: &str,
        config: WalkerConfig,
    ) -> Result<Self, RemoteError> {
        let root = with_retry(&config.retry_policy, "folder info", || {
            api.folder_info(root_key)
        })
        .await?;
        info!(folder = %root.name, key = %root.key, "opened root folder");
        Ok(Self { api, config, root })
    }

    /// The root folder's metadata.
    #[must_use]
    pub fn root(&self) -> &FolderInfo {
        &self.root
    }

    /// Walks the tree, sending each entry into `sink` as soon as its folder
    /// is listed. Entry ids start at 0 in emission order.
    #[instrument(skip(self, sink), fields(root = %self.root.key))]
    pub async fn walk(self, sink: mpsc::Sender<ManifestEntry>) -> WalkReport {
        let fan_out = self.config.listing_concurrency.max(1);
        let mut report = WalkReport::default();
        let mut registry = PathRegistry::new();
        let mut visited: HashSet<String> = HashSet::from([self.root.key.clone()]);
        let mut seen_files: HashSet<String> = HashSet::new();
        let mut next_id: u64 = 0;

        let root_path = registry.claim(Path::new(""), &sanitize_component(&self.root.name));
        let mut frontier = vec![PendingFolder {
            key: self.root.key.clone(),
            path: root_path,
        }];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            debug!(depth, folders = frontier.len(), "listing level");
            let mut next_frontier = Vec::new();

            let api = &self.api;
            let policy = &self.config.retry_policy;
            let mut listings = stream::iter(frontier)
                .map(|folder| async move {
                    let listing = list_folder(api, policy, &folder.key).await;
                    (folder, listing)
                })
                .buffered(fan_out);

            while let Some((folder, listing)) = listings.next().await {
                report.folders_listed += 1;

                for file in listing.files {
                    if !seen_files.insert(file.key.clone()) {
                        debug!(quick_key = %file.key, "duplicate file in listing, skipping");
                        report.duplicates_skipped += 1;
                        continue;
                    }
                    let relative_path =
                        registry.claim(&folder.path, &sanitize_component(&file.name));
                    let entry = ManifestEntry::new(
                        next_id,
                        file.key.clone(),
                        file.name.clone(),
                        relative_path,
                        file.share_url(api.base_url()),
                    )
                    .with_size(file.size)
                    .with_hash(file.hash);
                    next_id += 1;

                    if sink.send(entry).await.is_err() {
                        debug!("manifest receiver closed, stopping walk");
                        report.stopped_early = true;
                        return report;
                    }
                    report.entries_emitted += 1;
                }

                for sub in listing.folders {
                    if !visited.insert(sub.key.clone()) {
                        warn!(folder_key = %sub.key, "folder already visited, skipping cycle");
                        report.cycles_skipped += 1;
                        continue;
                    }
                    let path = registry.claim(&folder.path, &sanitize_component(&sub.name));
                    next_frontier.push(PendingFolder { key: sub.key, path });
                }

                if let Some(error) = listing.failure {
                    warn!(
                        folder_key = %folder.key,
                        path = %folder.path.display(),
                        error = %error,
                        "folder listing failed"
                    );
                    report.failures.push(BranchFailure {
                        folder_key: folder.key,
                        path: folder.path,
                        error,
                    });
                }
            }

            frontier = next_frontier;
            depth += 1;
        }

        info!(
            entries = report.entries_emitted,
            folders = report.folders_listed,
            failures = report.failures.len(),
            "folder walk finished"
        );
        report
    }

    /// Walks the whole tree into memory.
    pub async fn collect(self) -> (Vec<ManifestEntry>, WalkReport) {
        let (tx, mut rx) = mpsc::channel(64);
        let walk = self.walk(tx);
        let gather = async {
            let mut entries = Vec::new();
            while let Some(entry) = rx.recv().await {
                entries.push(entry);
            }
            entries
        };
        let (report, entries) = tokio::join!(walk, gather);
        (entries, report)
    }
}

/// Builds the manifest entry for a single-file share link.
///
/// # Errors
///
/// Returns [`RemoteError`] when the file info cannot be fetched.
#[instrument(skip(api, policy))]
pub async fn single_file_entry(
    api: &MediaFireApi,
    quick_key: &str,
    policy: &RetryPolicy,
) -> Result<ManifestEntry, RemoteError> {
    let file = with_retry(policy, "file info", || api.file_info(quick_key)).await?;
    let relative_path = PathBuf::from(sanitize_component(&file.name));
    let share_url = file.share_url(api.base_url());
    Ok(
        ManifestEntry::new(0, file.key, file.name, relative_path, share_url)
            .with_size(file.size)
            .with_hash(file.hash),
    )
}

async fn list_folder(api: &MediaFireApi, policy: &RetryPolicy, key: &str) -> FolderListing {
    let mut listing = FolderListing::default();

    let files = paginate(policy, "folder files", |chunk| api.folder_files(key, chunk)).await;
    listing.files = files.items;
    if let Some(error) = files.failure {
        listing.failure = Some(error);
        return listing;
    }

    let folders =
        paginate(policy, "folder subfolders", |chunk| api.folder_subfolders(key, chunk)).await;
    listing.folders = folders.items;
    listing.failure = folders.failure;
    listing
}

struct Paged<T> {
    items: Vec<T>,
    failure: Option<RemoteError>,
}

async fn paginate<T, F, Fut>(policy: &RetryPolicy, what: &'static str, mut fetch: F) -> Paged<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Chunk<T>, RemoteError>>,
{
    let mut items = Vec::new();
    for chunk in 1..=MAX_CHUNKS_PER_LISTING {
        match with_retry(policy, what, || fetch(chunk)).await {
            Ok(page) => {
                let empty = page.items.is_empty();
                items.extend(page.items);
                if !page.more || empty {
                    return Paged {
                        items,
                        failure: None,
                    };
                }
            }
            Err(error) => {
                return Paged {
                    items,
                    failure: Some(error),
                };
            }
        }
    }
    warn!(what, "listing exceeded chunk limit, truncating");
    Paged {
        items,
        failure: None,
    }
}

async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.should_retry(classify_remote_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        what,
                        attempt = next_attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying API call"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(what, %reason, "giving up on API call");
                    return Err(error);
                }
            },
        }
    }
}
