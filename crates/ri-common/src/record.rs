//! Record types flowing through the ingest pipeline.
//!
//! A `RawRecord` is produced once per input row and is immutable afterwards.
//! Header names are shared across all records of a run via `Arc`, so each row
//! carries only its own values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Canonical input column order. The parser accepts extra columns but
/// requires these to be present in the header row.
pub const COLUMNS: [&str; 7] = [
    "first_name",
    "last_name",
    "email",
    "department",
    "job_title",
    "hire_date",
    "salary",
];

/// One parsed input row: an ordered column -> value mapping.
#[derive(Debug, Clone)]
pub struct RawRecord {
    headers: Arc<[String]>,
    values: Vec<String>,
    /// 1-based line number in the source file (header excluded).
    line: u64,
}

impl RawRecord {
    pub fn new(headers: Arc<[String]>, values: Vec<String>, line: u64) -> Self {
        Self {
            headers,
            values,
            line,
        }
    }

    /// Look up a field by column name. Returns `None` when the column does
    /// not exist or the row is shorter than the header (the parser rejects
    /// the latter before a record is built).
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        self.values.get(idx).map(String::as_str)
    }

    /// Field value trimmed of surrounding whitespace, `None` when absent or
    /// blank.
    pub fn get_trimmed(&self, column: &str) -> Option<&str> {
        match self.get(column).map(str::trim) {
            Some("") | None => None,
            Some(v) => Some(v),
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Serialize the full record as a JSON object preserving column order.
    /// Stored alongside the row for audit traceability.
    pub fn to_audit_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.headers.len());
        for (h, v) in self.headers.iter().zip(self.values.iter()) {
            map.insert(h.clone(), serde_json::Value::String(v.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Result of validating a single record. Computed, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// Failure reasons in rule order; empty when valid.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// A record paired with its validation outcome; owned solely by the pipeline
/// until consumed by the batcher or discarded.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub record: RawRecord,
    pub outcome: ValidationOutcome,
}

impl ValidatedRecord {
    pub fn is_valid(&self) -> bool {
        self.outcome.is_valid
    }
}

/// Ordered group of validated records written as one persistence attempt.
pub type Batch = Vec<ValidatedRecord>;

/// A non-fatal per-record persistence failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    /// Email of the failing record (the natural key of the target table).
    pub email: String,
    /// Failure classification, e.g. `duplicate-email`.
    pub reason: String,
}

/// Result of persisting one batch; merged into the run summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceOutcome {
    pub inserted: u64,
    pub failed: u64,
    pub record_errors: Vec<RecordError>,
    /// Whether this batch degraded to per-record inserts.
    pub fell_back: bool,
}

impl PersistenceOutcome {
    pub fn merge(&mut self, other: PersistenceOutcome) {
        self.inserted += other.inserted;
        self.failed += other.failed;
        self.record_errors.extend(other.record_errors);
        self.fell_back |= other.fell_back;
    }
}

/// A single memory observation, retained only in a bounded trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySample {
    pub at: DateTime<Utc>,
    /// Live heap bytes tracked by the counting allocator, in MB.
    pub heap_used_mb: f64,
    /// Peak heap bytes over the process lifetime, in MB.
    pub heap_total_mb: f64,
    /// Resident set size from the OS, in MB (0 when unavailable).
    pub resident_mb: f64,
}
