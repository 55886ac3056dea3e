//! Stable exit codes for operator CLI commands.

use crate::core::types::Phase;
use crate::error::{ErrorKind, Failure};

/// Command succeeded or the run finished.
pub const OK: i32 = 0;
/// Invalid usage, config or goal, or an unexpected error.
pub const INVALID: i32 = 1;
/// The run ended in `Failed`.
pub const FAILED: i32 = 2;
/// The run was cancelled by the user.
pub const CANCELLED: i32 = 3;

/// Exit code for a run that reached `phase`.
pub fn for_run(phase: Phase, failure: Option<&Failure>) -> i32 {
    match (phase, failure) {
        (Phase::Finished, _) => OK,
        (_, Some(failure)) if failure.kind == ErrorKind::Cancelled => CANCELLED,
        (Phase::Failed, _) => FAILED,
        _ => INVALID,
    }
}
