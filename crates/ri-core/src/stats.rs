//! Run summary aggregation.
//!
//! Each stage owns its counters while the pipeline runs; they are merged here
//! exactly once, at the join point after all stage threads have finished.
//! Nothing is re-derived from raw data.

use std::time::Duration;

use serde::Serialize;

use ri_common::RecordError;

use crate::batch::BatchStats;
use crate::memory::MemoryReport;
use crate::persist::WriterStats;
use crate::throttle::ThrottleStats;
use crate::validate::ValidateStats;

/// Final, consistent summary of one ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Records that completed parsing and validation.
    pub parsed: u64,
    pub valid: u64,
    pub invalid: u64,

    pub inserted: u64,
    pub duplicates: u64,
    pub failed_other: u64,

    pub batches: u64,
    pub fallback_batches: u64,

    /// Invalid records dropped ahead of batching (validity filtering on).
    pub dropped_invalid: u64,

    /// Records delayed by the throttle valve.
    pub throttled_records: u64,

    pub elapsed_ms: u64,

    pub memory: Option<MemoryReport>,

    /// Per-record persistence failures, in arrival order.
    pub record_errors: Vec<RecordError>,
}

impl IngestSummary {
    /// Merge the per-stage counters at the single join point.
    pub fn assemble(
        validate: ValidateStats,
        throttle: ThrottleStats,
        batch: BatchStats,
        writer: WriterStats,
        memory: Option<MemoryReport>,
        elapsed: Duration,
    ) -> Self {
        Self {
            parsed: validate.parsed,
            valid: validate.valid,
            invalid: validate.invalid,
            inserted: writer.inserted,
            duplicates: writer.duplicates,
            failed_other: writer.failed_other,
            batches: writer.batches,
            fallback_batches: writer.fallback_batches,
            dropped_invalid: batch.dropped_invalid,
            throttled_records: throttle.delayed,
            elapsed_ms: elapsed.as_millis() as u64,
            memory,
            record_errors: writer.record_errors,
        }
    }

    pub fn records_per_sec(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.parsed as f64 * 1000.0 / self.elapsed_ms as f64
    }

    /// Core invariants; hold at all times, including mid-run snapshots.
    /// The persistence identity (`stored + duplicates + failed = valid`)
    /// additionally requires a clean, validity-filtered run.
    pub fn is_consistent(&self) -> bool {
        self.parsed == self.valid + self.invalid && self.inserted <= self.valid
    }

    /// Full accounting identity for a clean run with validity filtering.
    pub fn accounts_for_all_valid(&self) -> bool {
        self.inserted + self.duplicates + self.failed_other == self.valid
    }
}
