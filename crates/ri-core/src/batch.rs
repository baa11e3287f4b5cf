//! Fixed-capacity batcher.
//!
//! Accumulates validated records into ordered batches of at most B records.
//! Full batches are emitted eagerly; the in-progress batch is flushed exactly
//! once at end-of-input when non-empty, so emitted batches always have length
//! 1..=B. Optionally drops invalid records before batching.

use serde::Serialize;

use ri_common::{Batch, Result, ValidatedRecord};

use crate::pipeline::Stage;

/// Counters owned by the batcher, merged into the summary at the join point.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchStats {
    /// Batches emitted (including the final flush).
    pub batches: u64,
    /// Records placed into batches.
    pub batched_records: u64,
    /// Invalid records dropped before batching (filtering enabled).
    pub dropped_invalid: u64,
}

/// Order-preserving batching stage.
pub struct Batcher {
    capacity: usize,
    /// Drop invalid records instead of passing them through for separate
    /// handling downstream.
    filter_invalid: bool,
    current: Batch,
    pub stats: BatchStats,
}

impl Batcher {
    pub fn new(capacity: usize, filter_invalid: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            filter_invalid,
            current: Vec::new(),
            stats: BatchStats::default(),
        }
    }
}

impl Stage for Batcher {
    type In = ValidatedRecord;
    type Out = Batch;

    fn name(&self) -> &'static str {
        "batch"
    }

    fn process(&mut self, record: ValidatedRecord) -> Result<Option<Batch>> {
        if self.filter_invalid && !record.is_valid() {
            self.stats.dropped_invalid += 1;
            return Ok(None);
        }
        self.stats.batched_records += 1;
        self.current.push(record);
        if self.current.len() >= self.capacity {
            self.stats.batches += 1;
            let full = std::mem::take(&mut self.current);
            return Ok(Some(full));
        }
        Ok(None)
    }

    fn finish(&mut self) -> Result<Option<Batch>> {
        if self.current.is_empty() {
            return Ok(None);
        }
        self.stats.batches += 1;
        Ok(Some(std::mem::take(&mut self.current)))
    }
}
