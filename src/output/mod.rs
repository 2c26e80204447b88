//! CLI output formatting and display helpers.

use std::path::Path;

use indicatif::{HumanBytes, HumanDuration};
use mfbulk_core::{BranchFailure, ManifestPreview, StatsSnapshot};

use crate::app::history::HistoryRecord;

/// Summary lines printed after a run.
pub(crate) fn summary_lines(
    root: &Path,
    stats: &StatsSnapshot,
    walk_failures: &[BranchFailure],
) -> Vec<String> {
    let mut lines = vec![
        format!("Destination: {}", root.display()),
        format!(
            "Found {} | completed {} | skipped {} | filtered {} | failed {}",
            stats.found(),
            stats.completed,
            stats.skipped,
            stats.filtered,
            stats.failed
        ),
        format!(
            "Transferred {} in {}",
            HumanBytes(stats.bytes_transferred),
            HumanDuration(stats.elapsed)
        ),
    ];
    if stats.retried > 0 {
        lines.push(format!("Retries: {}", stats.retried));
    }
    for failure in walk_failures {
        lines.push(format!(
            "Could not list folder {} ({}): {}",
            failure.path.display(),
            failure.folder_key,
            failure.error
        ));
    }
    if stats.interrupted {
        lines.push("Interrupted. Run again to resume; finished files are skipped.".to_string());
    }
    lines
}

pub(crate) fn print_summary(root: &Path, stats: &StatsSnapshot, walk_failures: &[BranchFailure]) {
    for line in summary_lines(root, stats, walk_failures) {
        println!("{line}");
    }
}

/// Dry-run listing: one line per entry with its size.
pub(crate) fn preview_lines(preview: &ManifestPreview) -> Vec<String> {
    let mut lines = vec![format!("Destination: {}", preview.destination_root.display())];
    let mut known_total = 0u64;
    for entry in &preview.included {
        let size = entry.size_bytes.map_or_else(
            || "unknown size".to_string(),
            |size| HumanBytes(size).to_string(),
        );
        known_total += entry.size_bytes.unwrap_or(0);
        lines.push(format!("  {} ({size})", entry.relative_path.display()));
    }
    for entry in &preview.filtered {
        lines.push(format!("  [filtered] {}", entry.relative_path.display()));
    }
    for failure in &preview.walk_failures {
        lines.push(format!(
            "  [unlisted] {}: {}",
            failure.path.display(),
            failure.error
        ));
    }
    lines.push(format!(
        "{} file(s) to download, {} filtered, {} known",
        preview.included.len(),
        preview.filtered.len(),
        HumanBytes(known_total)
    ));
    lines
}

pub(crate) fn print_preview(preview: &ManifestPreview) {
    for line in preview_lines(preview) {
        println!("{line}");
    }
}

pub(crate) fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No downloads recorded yet.");
        return;
    }
    for record in records {
        println!(
            "{}  {}  {}  {}",
            record.completed_at_unix,
            record.file_name,
            HumanBytes(record.size_bytes),
            record.path.display()
        );
    }
}
