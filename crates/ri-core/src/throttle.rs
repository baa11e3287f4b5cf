//! Software backpressure valve.
//!
//! Sits on the record admission path. For every record it consults the
//! shared throttle flag; while pressure is high it injects a fixed delay
//! before admitting the record, reducing intake rate. This is deliberate
//! software backpressure, independent of and additional to the buffer-full
//! backpressure the bounded hand-off channels already apply.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use ri_common::{Result, ValidatedRecord};

use crate::memory::ThrottleState;
use crate::pipeline::Stage;

/// Counters owned by the valve.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThrottleStats {
    /// Records admitted (all of them, delayed or not).
    pub admitted: u64,
    /// Records that were delayed before admission.
    pub delayed: u64,
}

/// Record-admission stage consulting the monitor's pressure flag.
pub struct ThrottleValve {
    state: Arc<ThrottleState>,
    delay: Duration,
    pub stats: ThrottleStats,
}

impl ThrottleValve {
    pub fn new(state: Arc<ThrottleState>, delay: Duration) -> Self {
        Self {
            state,
            delay,
            stats: ThrottleStats::default(),
        }
    }
}

impl Stage for ThrottleValve {
    type In = ValidatedRecord;
    type Out = ValidatedRecord;

    fn name(&self) -> &'static str {
        "throttle"
    }

    fn process(&mut self, record: ValidatedRecord) -> Result<Option<ValidatedRecord>> {
        if self.state.is_throttling() {
            std::thread::sleep(self.delay);
            self.stats.delayed += 1;
        }
        self.stats.admitted += 1;
        Ok(Some(record))
    }
}
