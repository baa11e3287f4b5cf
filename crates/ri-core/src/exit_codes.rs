//! Exit codes for the roster-ingest CLI.
//!
//! Exit codes communicate run outcome without requiring output parsing.
//! 0 means a full successful pass over the input, even when some records
//! were invalid or duplicates; non-zero is reserved for infrastructure-level
//! failure.

use ri_common::Error;

/// Exit codes for roster-ingest operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Full pass over the input completed.
    Clean = 0,

    /// Configuration error
    ConfigError = 10,

    /// Input error (missing file, malformed structure)
    InputError = 11,

    /// Store unavailable
    StoreError = 12,

    /// I/O error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates an error.
    pub fn is_error(self) -> bool {
        (self as i32) != 0
    }

    /// Map a fatal pipeline error to its exit code.
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_) => ExitCode::ConfigError,
            Error::InputFile(_) | Error::MalformedInput(_) | Error::MissingColumn(_) => {
                ExitCode::InputError
            }
            Error::StoreUnavailable(_) => ExitCode::StoreError,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
            Error::Internal(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
