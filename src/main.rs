//! CLI entry point for mfbulk.

use std::process::ExitCode;

mod app;
mod cli;
mod output;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every entry completed or was already present.
    Success,
    /// Nothing was downloaded: bad input, unreachable link, or an early abort.
    Fatal,
    /// Some entries failed, some succeeded.
    Partial,
    /// Every attempted entry failed.
    Failure,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fatal => 1,
            Self::Partial => 2,
            Self::Failure => 3,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_mfbulk().await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(ProcessExit::Fatal.code())
        }
    }
}
