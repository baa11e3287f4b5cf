//! Roster Ingest core: bounded-memory staged ingest of employee CSV files
//! into a relational store.
//!
//! The pipeline is a single logical flow of staged transformations with
//! bounded hand-offs between stages:
//!
//! ```text
//! Parser -> Validator -> Throttle Valve -> Batcher -> Persistence Writer
//!                            ^
//!                            | pressure signal
//!                       Memory Monitor (periodic task)
//! ```
//!
//! Backpressure is structural: a stage blocks on `send` once its downstream
//! buffer is full, so memory stays bounded regardless of input size. The
//! memory monitor runs decoupled from the stages and only ever publishes a
//! lock-free throttle flag; the valve consults that flag on the record
//! admission path and injects a fixed delay while pressure is high.

pub mod batch;
pub mod exit_codes;
pub mod fixture;
pub mod memory;
pub mod parse;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod throttle;
pub mod validate;

pub use batch::Batcher;
pub use exit_codes::ExitCode;
pub use memory::{CountingAlloc, MemoryReport, MonitorHandle, PressureEvent, ThrottleState};
pub use parse::RecordParser;
pub use persist::{BatchWriter, EmployeeStore};
pub use pipeline::{run, RunOutcome, Stage};
pub use stats::IngestSummary;
pub use throttle::ThrottleValve;
pub use validate::validate;
