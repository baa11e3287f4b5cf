//! Error types for Roster Ingest.
//!
//! Only infrastructure-level conditions are `Error` values: they abort the
//! pipeline. Data-level conditions (validation failures, duplicate emails,
//! per-record insert failures) are tallied in stage counters and never
//! surface through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Roster Ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified fatal error type for Roster Ingest.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Input errors (20-29)
    #[error("input file not found: {0}")]
    InputFile(PathBuf),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    // Store errors (30-39)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors (90-99)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable error code for this error type.
    /// Used for detailed error reporting in logs.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InputFile(_) => 20,
            Error::MalformedInput(_) => 21,
            Error::MissingColumn(_) => 22,
            Error::StoreUnavailable(_) => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Internal(_) => 99,
        }
    }

    /// Whether this error originated in the input stream (as opposed to the
    /// store or configuration).
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Error::InputFile(_) | Error::MalformedInput(_) | Error::MissingColumn(_)
        )
    }
}
