//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the RustFind binary.
///
/// - 0: Success (completed normally, something was found)
/// - 1: General error (unexpected failure)
/// - 2: No matches (completed normally, nothing found)
/// - 3: Partial success (completed with non-fatal errors in the run log)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The search completed and found at least one entry.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The search completed without matches.
    NoMatches = 2,
    /// The search completed but some entries could not be examined.
    PartialSuccess = 3,
    /// The search was interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric process exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RF000",
            Self::GeneralError => "RF001",
            Self::NoMatches => "RF002",
            Self::PartialSuccess => "RF003",
            Self::Interrupted => "RF130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g. "RF001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build a structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
