//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: batch scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args, no steps to run)              |
//! | 3    | Invalid pipeline configuration                           |
//! | 4    | One or more steps failed                                 |
//! | 5    | File access error (missing, locked, unreadable input)    |
//! | 6    | Completed with warnings (only with `--strict-exit`)      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use waybill_cli::StepError;
use waybill_io::TableIoError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, nothing to run.
pub const EXIT_USAGE: u8 = 2;

/// Pipeline file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// At least one step in the run finished as failed.
pub const EXIT_STEP_FAILED: u8 = 4;

/// Input missing or unreadable, output locked or unwritable.
pub const EXIT_FILE_ACCESS: u8 = 5;

/// Steps warned or were skipped, and `--strict-exit` was given.
pub const EXIT_WARNINGS: u8 = 6;

/// Map a step error (outside a pipeline run) to its exit code.
pub fn step_exit_code(err: &StepError) -> u8 {
    match err {
        StepError::Io(TableIoError::NotFound { .. } | TableIoError::Access { .. }) => EXIT_FILE_ACCESS,
        StepError::Io(_) => EXIT_ERROR,
        StepError::Recon(_) => EXIT_ERROR,
        StepError::Failed(_) => EXIT_ERROR,
    }
}
