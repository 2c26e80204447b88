//! Progress UI driven by executor events.
//!
//! One task owns every bar. It drains the event channel until the executor
//! drops its sender, then hands back the files that completed so the caller
//! can record them.

use std::collections::HashMap;
use std::path::PathBuf;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mfbulk_core::{DownloadResult, EngineEvent, EntryState, ProgressEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Longest file name shown on a per-file bar.
const NAME_WIDTH: usize = 32;

/// A file that was transferred during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletedFile {
    pub(crate) display_name: String,
    pub(crate) relative_path: PathBuf,
    pub(crate) bytes_written: u64,
}

fn style(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| fallback())
}

pub(crate) struct ProgressRenderer {
    multi: MultiProgress,
    overall: ProgressBar,
    files: ProgressBar,
    active: HashMap<u64, ProgressBar>,
    last_bytes: HashMap<u64, u64>,
    completed: Vec<CompletedFile>,
}

impl ProgressRenderer {
    pub(crate) fn new(multi: MultiProgress, visible: bool) -> Self {
        if !visible {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(style(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
            ProgressStyle::default_bar,
        ));
        let files = multi.add(ProgressBar::new(0));
        files.set_style(style("  files {pos}/{len} {msg}", ProgressStyle::default_bar));
        Self {
            multi,
            overall,
            files,
            active: HashMap::new(),
            last_bytes: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Discovered(found) => {
                self.files.inc_length(1);
                if let Some(total) = found.total_bytes {
                    self.overall.inc_length(total);
                }
            }
            EngineEvent::Progress(progress) => self.apply_progress(progress),
        }
    }

    fn apply_progress(&mut self, progress: ProgressEvent) {
        let id = progress.entry_id;
        match &progress.state {
            EntryState::Queued | EntryState::Resolving => {}
            EntryState::Downloading => {
                let last = self.last_bytes.entry(id).or_insert(0);
                // A retry restarts the count; only forward movement is added.
                if progress.bytes_so_far > *last {
                    self.overall.inc(progress.bytes_so_far - *last);
                }
                *last = progress.bytes_so_far;

                let bar = self
                    .active
                    .entry(id)
                    .or_insert_with(|| new_file_bar(&self.multi, &progress));
                bar.set_position(progress.bytes_so_far);
            }
            EntryState::Finished(result) => {
                self.last_bytes.remove(&id);
                if let Some(bar) = self.active.remove(&id) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                self.files.inc(1);
                match result {
                    DownloadResult::Completed { bytes_written } => {
                        self.completed.push(CompletedFile {
                            display_name: progress.display_name.clone(),
                            relative_path: progress.relative_path.clone(),
                            bytes_written: *bytes_written,
                        });
                    }
                    DownloadResult::Skipped(_) => {
                        if let (Some(total), Some(len)) = (progress.total_bytes, self.overall.length()) {
                            self.overall.set_length(len.saturating_sub(total));
                        }
                    }
                    DownloadResult::Failed(error) => {
                        self.files
                            .set_message(format!("last failure: {}", error.kind_label()));
                    }
                }
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<CompletedFile> {
        for bar in self.active.values() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
        self.files.finish_and_clear();
        self.completed
    }
}

fn new_file_bar(multi: &MultiProgress, progress: &ProgressEvent) -> ProgressBar {
    let bar = match progress.total_bytes {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    let bar = multi.add(bar);
    bar.set_style(style(
        "  {msg:32} [{bar:25}] {bytes}/{total_bytes}",
        ProgressStyle::default_bar,
    ));
    bar.set_message(truncate_name(&progress.display_name, NAME_WIDTH));
    bar
}

fn truncate_name(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let mut out: String = name.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Spawns the consumer; the handle resolves once the sender side is gone.
pub(crate) fn spawn_progress_ui(
    renderer: ProgressRenderer,
    mut events: UnboundedReceiver<EngineEvent>,
) -> JoinHandle<Vec<CompletedFile>> {
    tokio::spawn(async move {
        let mut renderer = renderer;
        while let Some(event) = events.recv().await {
            renderer.apply(event);
        }
        renderer.finish()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mfbulk_core::{Discovered, DownloadError, ExtractError, SkipReason};

    fn progress(id: u64, bytes: u64, state: EntryState) -> EngineEvent {
        EngineEvent::Progress(ProgressEvent {
            entry_id: id,
            display_name: format!("file{id}.bin"),
            relative_path: PathBuf::from(format!("root/file{id}.bin")),
            bytes_so_far: bytes,
            total_bytes: Some(100),
            state,
        })
    }

    fn discovered(id: u64) -> EngineEvent {
        EngineEvent::Discovered(Discovered {
            entry_id: id,
            display_name: format!("file{id}.bin"),
            total_bytes: Some(100),
        })
    }

    #[test]
    fn test_renderer_tracks_bytes_and_files() {
        let mut renderer = ProgressRenderer::new(MultiProgress::new(), false);
        renderer.apply(discovered(0));
        renderer.apply(discovered(1));
        assert_eq!(renderer.files.length(), Some(2));
        assert_eq!(renderer.overall.length(), Some(200));

        renderer.apply(progress(0, 40, EntryState::Downloading));
        renderer.apply(progress(0, 100, EntryState::Downloading));
        assert_eq!(renderer.overall.position(), 100);
        assert_eq!(renderer.active.len(), 1);

        renderer.apply(progress(
            0,
            100,
            EntryState::Finished(DownloadResult::Completed { bytes_written: 100 }),
        ));
        assert!(renderer.active.is_empty());
        assert_eq!(renderer.files.position(), 1);

        renderer.apply(progress(
            1,
            0,
            EntryState::Finished(DownloadResult::Skipped(SkipReason::AlreadyExists)),
        ));
        assert_eq!(renderer.overall.length(), Some(100));

        let completed = renderer.finish();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].relative_path, PathBuf::from("root/file0.bin"));
    }

    #[test]
    fn test_retry_restart_does_not_double_count() {
        let mut renderer = ProgressRenderer::new(MultiProgress::new(), false);
        renderer.apply(discovered(0));
        renderer.apply(progress(0, 60, EntryState::Downloading));
        renderer.apply(progress(0, 10, EntryState::Downloading));
        renderer.apply(progress(0, 70, EntryState::Downloading));
        assert_eq!(renderer.overall.position(), 70);
    }

    #[test]
    fn test_failed_entry_is_not_reported_completed() {
        let mut renderer = ProgressRenderer::new(MultiProgress::new(), false);
        renderer.apply(progress(
            3,
            0,
            EntryState::Finished(DownloadResult::Failed(DownloadError::Extract(
                ExtractError::SourceRemoved,
            ))),
        ));
        assert!(renderer.finish().is_empty());
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short.txt", 32), "short.txt");
        assert_eq!(truncate_name("abcdef", 4), "abc…");
    }

    #[tokio::test]
    async fn test_spawn_progress_ui_returns_when_sender_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_progress_ui(ProgressRenderer::new(MultiProgress::new(), false), rx);
        tx.send(progress(
            0,
            5,
            EntryState::Finished(DownloadResult::Completed { bytes_written: 5 }),
        ))
        .unwrap();
        drop(tx);
        let completed = handle.await.unwrap();
        assert_eq!(completed.len(), 1);
    }
}
