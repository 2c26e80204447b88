//! Exit code logic for the mfbulk process.
//!
//! Single responsibility: map the final counters to the process exit outcome.

use mfbulk_core::StatsSnapshot;

use crate::ProcessExit;

/// Determines the process exit outcome from succeeded and failed entry counts.
///
/// Skipped entries count as succeeded.
pub(crate) fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Exit outcome for a run that got past startup.
///
/// Each folder that could not be listed counts as one failure, since its
/// subtree was never downloaded. An interrupted run never reports success: it
/// is partial when something finished and aborted otherwise.
pub(crate) fn outcome_for_run(stats: &StatsSnapshot, walk_failures: usize) -> ProcessExit {
    let succeeded = stats.completed + stats.skipped;
    let failed = stats.failed + walk_failures;
    if stats.interrupted && failed == 0 {
        return if succeeded > 0 {
            ProcessExit::Partial
        } else {
            ProcessExit::Fatal
        };
    }
    determine_exit_outcome(succeeded, failed)
}
