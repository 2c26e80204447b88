use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use mfbulk_core::{RunRequest, plan, run};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::config::{self, Settings};
use crate::app::history::{self, HistoryRecord};
use crate::app::progress_manager::{self, CompletedFile, ProgressRenderer};
use crate::app::{exit_handler, terminal};
use crate::cli::Args;
use crate::output;

/// Overrides the hosting service base URL (used by end-to-end tests).
const API_BASE_ENV: &str = "MFBULK_API_BASE_URL";

pub(crate) async fn run_mfbulk() -> Result<ProcessExit> {
    let args = Args::parse();

    let multi = MultiProgress::new();
    terminal::init_tracing(terminal::default_log_level(args.quiet, args.verbose), &multi);
    debug!(?args, "CLI arguments parsed");

    let file_config = config::load_default_file_config()?;
    if file_config.is_some() {
        debug!("loaded config file");
    }
    let settings = config::resolve_settings(&args, file_config.as_ref());

    if args.history {
        let records = match history::default_history_path() {
            Some(path) => history::read_recent(&path, history::RECENT_LIMIT)?,
            None => Vec::new(),
        };
        output::print_history(&records);
        return Ok(ProcessExit::Success);
    }

    let Some(url) = args.url.clone() else {
        return Ok(ProcessExit::Success);
    };
    let request = build_request(url, &settings);
    let cwd = std::env::current_dir().context("cannot determine current directory")?;

    if args.dry_run {
        let preview = match plan(&request, &cwd).await {
            Ok(preview) => preview,
            Err(e) => {
                eprintln!("Error: {e}");
                return Ok(ProcessExit::Fatal);
            }
        };
        output::print_preview(&preview);
        return Ok(ProcessExit::Success);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let show_progress = terminal::should_use_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = progress_manager::spawn_progress_ui(
        ProgressRenderer::new(multi, show_progress),
        events_rx,
    );

    let result = run(request, Some(events_tx), Arc::clone(&interrupted), &cwd).await;
    // The executor's sender is gone once `run` returns, so the UI task ends.
    let completed = progress.await.unwrap_or_default();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ProcessExit::Fatal);
        }
    };

    if settings.history {
        record_history(&outcome.destination_root, &completed);
    }

    if !args.quiet {
        output::print_summary(
            &outcome.destination_root,
            &outcome.stats,
            &outcome.walk_failures,
        );
    }
    info!(
        completed = outcome.stats.completed,
        skipped = outcome.stats.skipped,
        failed = outcome.stats.failed,
        "run finished"
    );
    if outcome.stats.interrupted {
        warn!(completed = outcome.stats.completed, "Interrupted. Run again to resume.");
    }

    Ok(exit_handler::outcome_for_run(
        &outcome.stats,
        outcome.walk_failures.len(),
    ))
}

fn build_request(url: String, settings: &Settings) -> RunRequest {
    let mut request = RunRequest::new(url);
    request.output_path.clone_from(&settings.output);
    request.concurrency = settings.threads;
    request.listing_concurrency = settings.listing_threads;
    request.filter = settings.filter.clone();
    request.retry_policy = settings.retry_policy();
    request.fail_fast = settings.fail_fast;
    request.connect_timeout_secs = settings.connect_timeout_secs;
    request.read_timeout_secs = settings.read_timeout_secs;
    if let Some(base) = std::env::var(API_BASE_ENV).ok().filter(|v| !v.is_empty()) {
        debug!(base = %base, "using API base override");
        request.api_base_url = base;
    }
    request
}

fn record_history(root: &std::path::Path, completed: &[CompletedFile]) {
    let Some(path) = history::default_history_path() else {
        return;
    };
    let records: Vec<HistoryRecord> = completed
        .iter()
        .map(|file| {
            HistoryRecord::now(
                file.display_name.clone(),
                root.join(&file.relative_path),
                file.bytes_written,
            )
        })
        .collect();
    if let Err(e) = history::append_records(&path, &records) {
        warn!(error = %e, "could not update download history");
    }
}
