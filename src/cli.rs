//! CLI argument definitions using clap derive macros.

use clap::Parser;

/// Download files and whole folders from MediaFire share links.
///
/// Folder links are walked recursively and mirrored under the output root.
/// Files already present with the right size and hash are skipped, so an
/// interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "mfbulk")]
#[command(author, version, about)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// MediaFire file or folder link
    #[arg(required_unless_present = "history")]
    pub url: Option<String>,

    /// Output directory (default: current dir for files, ./TXAM-F for folders)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Concurrent downloads (1-100) [default: 10]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub threads: Option<u8>,

    /// Folders listed in parallel (1-16) [default: 4]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub listing_threads: Option<u8>,

    /// Retries after the first attempt for transient failures (0-10) [default: 2]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Comma-separated file extensions to skip (replaces the default list)
    #[arg(long = "ie", visible_alias = "ignore-extensions", value_delimiter = ',')]
    pub ignore_extensions: Option<Vec<String>>,

    /// Comma-separated file names or globs to skip (replaces the default list)
    #[arg(long = "in", visible_alias = "ignore-names", value_delimiter = ',')]
    pub ignore_names: Option<Vec<String>>,

    /// Stop scheduling new downloads after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// List what would be downloaded without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Show recent downloads and exit
    #[arg(long, conflicts_with = "no_history")]
    pub history: bool,

    /// Do not record completed downloads
    #[arg(long)]
    pub no_history: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
