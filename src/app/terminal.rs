use std::io::{self, Write};

use indicatif::MultiProgress;
use tracing_subscriber::EnvFilter;

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_use_progress(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// `RUST_LOG` wins; otherwise -q, -v and -vv pick the level.
pub(crate) fn default_log_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Stderr writer that hides progress bars while a log line is printed.
struct SuspendingWriter {
    multi: MultiProgress,
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().flush())
    }
}

pub(crate) fn init_tracing(default_level: &str, multi: &MultiProgress) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let multi = multi.clone();
    let _ = tracing_subscriber::fmt()
        .with_writer(move || SuspendingWriter {
            multi: multi.clone(),
        })
        .with_env_filter(filter)
        .try_init();
}
