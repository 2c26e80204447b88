//! One invocation, end to end.
//!
//! [`run`] classifies the share link, decides the destination root, builds the
//! manifest source (single file lookup or folder walk), prunes it through the
//! filter and hands the rest to the [`DownloadExecutor`]. Everything that can
//! fail before the first worker starts is returned as a [`RunError`]; after
//! that, failures are per entry and show up in the returned stats.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::destination::resolve_destination;
use crate::download::{
    AggregateStats, DEFAULT_CONCURRENCY, DownloadExecutor, EngineError, EventSender,
    ExecutorConfig, RetryPolicy, StatsSnapshot,
};
use crate::error::{ConfigError, FilesystemError, RemoteError};
use crate::fetch::Fetcher;
use crate::fetch::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::filter::FilterRules;
use crate::manifest::ManifestEntry;
use crate::remote::{DEFAULT_BASE_URL, MediaFireApi};
use crate::share::{ShareKind, ShareLink};
use crate::walker::{
    BranchFailure, DEFAULT_LISTING_CONCURRENCY, FolderWalker, WalkerConfig, single_file_entry,
};

/// Capacity of the manifest channels between walker, filter and executor.
const MANIFEST_BUFFER: usize = 256;

/// Fatal errors: nothing was downloaded.
#[derive(Debug, Error)]
pub enum RunError {
    /// Bad share link or output path.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The destination root could not be created.
    #[error("cannot create destination root: {0}")]
    CreateRoot(FilesystemError),

    /// Root folder or file info was unavailable.
    #[error("cannot read share link metadata: {0}")]
    Remote(#[from] RemoteError),

    /// The executor could not start.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The HTTP client could not be built.
    #[error("failed to initialize HTTP client: {0}")]
    Client(String),
}

/// Inputs for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// File or folder share link.
    pub share_url: String,
    /// Explicit output path (`-o`), unexpanded.
    pub output_path: Option<String>,
    /// Download worker slots.
    pub concurrency: usize,
    /// Folders listed in parallel.
    pub listing_concurrency: usize,
    /// Entries to leave out.
    pub filter: FilterRules,
    /// Retry policy for API calls and downloads.
    pub retry_policy: RetryPolicy,
    /// Stop scheduling on the first failure.
    pub fail_fast: bool,
    /// Hosting service base URL.
    pub api_base_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl RunRequest {
    /// A request with default settings.
    #[must_use]
    pub fn new(share_url: impl Into<String>) -> Self {
        Self {
            share_url: share_url.into(),
            output_path: None,
            concurrency: DEFAULT_CONCURRENCY,
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            filter: FilterRules::default(),
            retry_policy: RetryPolicy::default(),
            fail_fast: false,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// Result of a run that got past startup.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Absolute destination root.
    pub destination_root: PathBuf,
    /// Final counters.
    pub stats: StatsSnapshot,
    /// Folders that could not be listed.
    pub walk_failures: Vec<BranchFailure>,
}

/// Manifest of a run that was only planned, not executed.
#[derive(Debug, Clone)]
pub struct ManifestPreview {
    /// Where files would be written.
    pub destination_root: PathBuf,
    /// Entries that would be scheduled.
    pub included: Vec<ManifestEntry>,
    /// Entries removed by the filter.
    pub filtered: Vec<ManifestEntry>,
    /// Folders that could not be listed.
    pub walk_failures: Vec<BranchFailure>,
}

enum ManifestSource {
    Single(ManifestEntry),
    Folder(FolderWalker),
}

impl ManifestSource {
    async fn open(api: MediaFireApi, link: &ShareLink, request: &RunRequest) -> Result<Self, RemoteError> {
        match link.kind {
            ShareKind::File => {
                let entry = single_file_entry(&api, &link.key, &request.retry_policy).await?;
                Ok(Self::Single(entry))
            }
            ShareKind::Folder => {
                let config = WalkerConfig {
                    listing_concurrency: request.listing_concurrency,
                    retry_policy: request.retry_policy.clone(),
                };
                Ok(Self::Folder(FolderWalker::open(api, &link.key, config).await?))
            }
        }
    }

    async fn produce(self, sink: mpsc::Sender<ManifestEntry>) -> Vec<BranchFailure> {
        match self {
            Self::Single(entry) => {
                let _ = sink.send(entry).await;
                Vec::new()
            }
            Self::Folder(walker) => walker.walk(sink).await.failures,
        }
    }
}

struct Prepared {
    link: ShareLink,
    destination_root: PathBuf,
    fetcher: Fetcher,
    api: MediaFireApi,
}

fn prepare(request: &RunRequest, cwd: &Path) -> Result<Prepared, RunError> {
    let link = ShareLink::parse(&request.share_url)?;
    let destination_root =
        resolve_destination(link.kind, request.output_path.as_deref(), cwd)?;
    let fetcher = Fetcher::with_timeouts(request.connect_timeout_secs, request.read_timeout_secs)
        .map_err(|e| RunError::Client(e.to_string()))?;
    let api = MediaFireApi::with_base_url(fetcher.clone(), request.api_base_url.clone());
    debug!(kind = %link.kind, key = %link.key, root = %destination_root.display(), "run prepared");
    Ok(Prepared {
        link,
        destination_root,
        fetcher,
        api,
    })
}

/// Runs one share link to completion or cancellation.
///
/// `cwd` anchors relative output paths and the smart default. Progress goes to
/// `events` when given. Setting `cancel` stops scheduling; in-flight downloads
/// get a short grace period.
///
/// # Errors
///
/// Returns [`RunError`] for failures before any download starts: invalid
/// link or output path, an uncreatable destination root, or unavailable root
/// metadata.
#[instrument(skip(request, events, cancel, cwd), fields(url = %request.share_url))]
pub async fn run(
    request: RunRequest,
    events: Option<EventSender>,
    cancel: Arc<AtomicBool>,
    cwd: &Path,
) -> Result<RunOutcome, RunError> {
    let prepared = prepare(&request, cwd)?;
    let root = prepared.destination_root;

    let stats = Arc::new(AggregateStats::new());
    let config = ExecutorConfig {
        concurrency: request.concurrency,
        retry_policy: request.retry_policy.clone(),
        fail_fast: request.fail_fast,
        ..ExecutorConfig::default()
    };
    let mut executor =
        DownloadExecutor::new(prepared.fetcher, config)?.with_stats(Arc::clone(&stats));
    if let Some(events) = events {
        executor = executor.with_events(events);
    }

    let source = ManifestSource::open(prepared.api, &prepared.link, &request).await?;

    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| RunError::CreateRoot(FilesystemError::from_io(&root, &e)))?;

    let (walk_tx, walk_rx) = mpsc::channel(MANIFEST_BUFFER);
    let (work_tx, work_rx) = mpsc::channel(MANIFEST_BUFFER);
    let producer = tokio::spawn(source.produce(walk_tx));
    let forwarder = tokio::spawn(forward_included(
        walk_rx,
        work_tx,
        request.filter.clone(),
        Arc::clone(&stats),
    ));

    info!(root = %root.display(), "downloading");
    executor.execute(work_rx, &root, cancel).await?;

    if let Err(e) = forwarder.await {
        warn!(error = %e, "filter task failed");
    }
    let walk_failures = match producer.await {
        Ok(failures) => failures,
        Err(e) => {
            warn!(error = %e, "manifest task failed");
            Vec::new()
        }
    };

    Ok(RunOutcome {
        destination_root: root,
        stats: stats.snapshot(),
        walk_failures,
    })
}

/// Builds the filtered manifest without downloading or creating anything.
///
/// # Errors
///
/// Same startup errors as [`run`], minus root creation.
#[instrument(skip(request, cwd), fields(url = %request.share_url))]
pub async fn plan(request: &RunRequest, cwd: &Path) -> Result<ManifestPreview, RunError> {
    let prepared = prepare(request, cwd)?;
    let source = ManifestSource::open(prepared.api, &prepared.link, request).await?;

    let (tx, mut rx) = mpsc::channel(MANIFEST_BUFFER);
    let produce = source.produce(tx);
    let gather = async {
        let mut included = Vec::new();
        let mut filtered = Vec::new();
        while let Some(entry) = rx.recv().await {
            if request.filter.should_include(&entry) {
                included.push(entry);
            } else {
                filtered.push(entry);
            }
        }
        (included, filtered)
    };
    let (walk_failures, (included, filtered)) = tokio::join!(produce, gather);

    Ok(ManifestPreview {
        destination_root: prepared.destination_root,
        included,
        filtered,
        walk_failures,
    })
}

/// Moves entries from the walker to the executor, dropping filtered ones.
async fn forward_included(
    mut from: mpsc::Receiver<ManifestEntry>,
    to: mpsc::Sender<ManifestEntry>,
    filter: FilterRules,
    stats: Arc<AggregateStats>,
) {
    while let Some(entry) = from.recv().await {
        if !filter.should_include(&entry) {
            debug!(entry_id = entry.id, name = %entry.display_name, "filtered out");
            stats.record_filtered();
            continue;
        }
        if to.send(entry).await.is_err() {
            debug!("executor stopped, dropping remaining manifest");
            break;
        }
    }
}
