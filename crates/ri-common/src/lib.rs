//! Roster Ingest common types and errors.
//!
//! This crate provides foundational types shared across ri-core modules:
//! - Record types flowing through the ingest pipeline
//! - Persistence and memory-sample value types
//! - Common error types

pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::{
    Batch, MemorySample, PersistenceOutcome, RawRecord, RecordError, ValidatedRecord,
    ValidationOutcome, COLUMNS,
};
