//! Pipeline composition: stage threads wired with bounded hand-off channels.
//!
//! Each stage implements the single [`Stage`] contract and runs on its own
//! thread; a blocked `send` into a full bounded channel is the backpressure
//! mechanism that propagates writer slowness all the way up to the parser.
//! No stage is invoked concurrently with itself, and the memory monitor
//! never participates in the hand-offs: it only publishes the throttle flag.
//!
//! Teardown: a fatal error in any thread drops that thread's channel ends;
//! upstream senders observe the disconnect and finish, downstream receivers
//! drain and finish. The first root-cause error is surfaced, with whatever
//! counters the stages had gathered by then.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use ri_common::{Batch, Error, RawRecord, Result, ValidatedRecord};
use ri_config::IngestConfig;

use crate::batch::Batcher;
use crate::memory::{MonitorHandle, ThrottleState};
use crate::parse::RecordParser;
use crate::persist::{BatchWriter, EmployeeStore};
use crate::stats::IngestSummary;
use crate::throttle::ThrottleValve;
use crate::validate::ValidateStage;

/// The single processing contract every pipeline stage implements.
///
/// `process` consumes one item and may emit zero or one output; `finish` runs
/// once after end-of-input and may emit a final output (the batcher's flush).
pub trait Stage: Send {
    type In: Send + 'static;
    type Out: Send + 'static;

    fn name(&self) -> &'static str;

    fn process(&mut self, item: Self::In) -> Result<Option<Self::Out>>;

    fn finish(&mut self) -> Result<Option<Self::Out>> {
        Ok(None)
    }
}

/// Outcome of one pipeline run: the summary is always present, with partial
/// counters when a fatal error aborted the run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: IngestSummary,
    pub error: Option<Error>,
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Run the full ingest pipeline over `input` into the store at `db`.
pub fn run(cfg: &IngestConfig, input: &Path, db: &Path) -> RunOutcome {
    let started = Instant::now();
    match execute(cfg, input, db, started) {
        Ok(outcome) => outcome,
        // Setup failure: nothing ran, report empty counters.
        Err(e) => RunOutcome {
            summary: IngestSummary {
                elapsed_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
            error: Some(e),
        },
    }
}

fn execute(cfg: &IngestConfig, input: &Path, db: &Path, started: Instant) -> Result<RunOutcome> {
    cfg.validate()?;
    info!(
        input = %input.display(),
        db = %db.display(),
        batch_size = cfg.batch_size,
        "starting ingest"
    );

    let parser = RecordParser::open(input)?;
    let store = EmployeeStore::open(db)?;
    let mut writer = BatchWriter::new(store);

    let (monitor, throttle_state) = if cfg.disable_memory_monitor {
        debug!("memory monitor disabled");
        (None, Arc::new(ThrottleState::default()))
    } else {
        let handle = MonitorHandle::start(cfg)?;
        let state = handle.state();
        (Some(handle), state)
    };

    let (raw_tx, raw_rx) = bounded::<RawRecord>(cfg.record_queue_depth);
    let (valid_tx, valid_rx) = bounded::<ValidatedRecord>(cfg.record_queue_depth);
    let (admit_tx, admit_rx) = bounded::<ValidatedRecord>(cfg.record_queue_depth);
    let (batch_tx, batch_rx) = bounded::<Batch>(cfg.batch_queue_depth);

    let source = thread::Builder::new().name("ri-parse".into()).spawn(move || {
        let mut rows = 0u64;
        for item in parser {
            match item {
                Ok(record) => {
                    rows += 1;
                    // Downstream gone: either a fatal error below us or a
                    // finished run; stop reading either way.
                    if raw_tx.send(record).is_err() {
                        return (rows, None);
                    }
                }
                Err(e) => return (rows, Some(e)),
            }
        }
        (rows, None)
    })?;

    let validate = spawn_stage("ri-validate", ValidateStage::default(), raw_rx, valid_tx)?;
    let valve = spawn_stage(
        "ri-throttle",
        ThrottleValve::new(throttle_state, Duration::from_millis(cfg.throttle_delay_ms)),
        valid_rx,
        admit_tx,
    )?;
    let batcher = spawn_stage(
        "ri-batch",
        Batcher::new(cfg.batch_size, cfg.filter_invalid),
        admit_rx,
        batch_tx,
    )?;

    let sink = thread::Builder::new().name("ri-persist".into()).spawn(move || {
        for batch in batch_rx.iter() {
            match writer.write_batch(&batch) {
                Ok(outcome) => debug!(
                    inserted = outcome.inserted,
                    failed = outcome.failed,
                    fell_back = outcome.fell_back,
                    "batch persisted"
                ),
                Err(e) => return (writer, Some(e)),
            }
        }
        (writer, None)
    })?;

    let (rows_read, parse_err) = join_stage(source, "ri-parse")?;
    let (validate_stage, validate_err) = join_stage(validate, "ri-validate")?;
    let (valve_stage, valve_err) = join_stage(valve, "ri-throttle")?;
    let (batch_stage, batch_err) = join_stage(batcher, "ri-batch")?;
    let (writer, writer_err) = join_stage(sink, "ri-persist")?;

    let memory = monitor.map(MonitorHandle::stop);

    let error = parse_err
        .or(validate_err)
        .or(valve_err)
        .or(batch_err)
        .or(writer_err);

    let summary = IngestSummary::assemble(
        validate_stage.stats,
        valve_stage.stats,
        batch_stage.stats,
        writer.into_stats(),
        memory,
        started.elapsed(),
    );

    match &error {
        Some(e) => warn!(code = e.code(), error = %e, rows_read, "ingest aborted"),
        None => info!(
            rows_read,
            inserted = summary.inserted,
            invalid = summary.invalid,
            duplicates = summary.duplicates,
            elapsed_ms = summary.elapsed_ms,
            "ingest complete"
        ),
    }

    Ok(RunOutcome { summary, error })
}

/// Drive one stage on its own thread. The stage is returned with its
/// counters even when it failed, so partial runs still report.
fn spawn_stage<S>(
    name: &'static str,
    mut stage: S,
    rx: Receiver<S::In>,
    tx: Sender<S::Out>,
) -> Result<JoinHandle<(S, Option<Error>)>>
where
    S: Stage + 'static,
{
    let handle = thread::Builder::new().name(name.into()).spawn(move || {
        for item in rx.iter() {
            match stage.process(item) {
                Ok(Some(out)) => {
                    if tx.send(out).is_err() {
                        return (stage, None);
                    }
                }
                Ok(None) => {}
                Err(e) => return (stage, Some(e)),
            }
        }
        // End of input: flush.
        match stage.finish() {
            Ok(Some(out)) => {
                let _ = tx.send(out);
                (stage, None)
            }
            Ok(None) => (stage, None),
            Err(e) => (stage, Some(e)),
        }
    })?;
    Ok(handle)
}

fn join_stage<T>(handle: JoinHandle<T>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::Internal(format!("{name} thread panicked")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Doubling stage used to exercise the generic runner.
    struct Doubler {
        seen: u64,
    }

    impl Stage for Doubler {
        type In = u64;
        type Out = u64;

        fn name(&self) -> &'static str {
            "double"
        }

        fn process(&mut self, item: u64) -> Result<Option<u64>> {
            self.seen += 1;
            Ok(Some(item * 2))
        }
    }

    /// Stage that fails on a marker value.
    struct FailOn(u64);

    impl Stage for FailOn {
        type In = u64;
        type Out = u64;

        fn name(&self) -> &'static str {
            "fail-on"
        }

        fn process(&mut self, item: u64) -> Result<Option<u64>> {
            if item == self.0 {
                return Err(Error::Internal("poison".into()));
            }
            Ok(Some(item))
        }
    }

    #[test]
    fn runner_processes_stream_and_returns_stage() {
        let (in_tx, in_rx) = bounded::<u64>(4);
        let (out_tx, out_rx) = bounded::<u64>(4);
        let handle = spawn_stage("double", Doubler { seen: 0 }, in_rx, out_tx).unwrap();
        for i in 0..10 {
            in_tx.send(i).unwrap();
        }
        drop(in_tx);
        let outputs: Vec<u64> = out_rx.iter().collect();
        let (stage, err) = handle.join().unwrap();
        assert!(err.is_none());
        assert_eq!(stage.seen, 10);
        assert_eq!(outputs, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn runner_surfaces_stage_error_and_stops() {
        let (in_tx, in_rx) = bounded::<u64>(8);
        let (out_tx, out_rx) = bounded::<u64>(8);
        let handle = spawn_stage("fail-on", FailOn(3), in_rx, out_tx).unwrap();
        for i in 0..8 {
            // Senders may fail once the stage has died; that is expected.
            if in_tx.send(i).is_err() {
                break;
            }
        }
        drop(in_tx);
        let _drained: Vec<u64> = out_rx.iter().collect();
        let (_, err) = handle.join().unwrap();
        assert!(matches!(err, Some(Error::Internal(_))));
    }

    #[test]
    fn runner_exits_quietly_when_downstream_disconnects() {
        let (in_tx, in_rx) = bounded::<u64>(2);
        let (out_tx, out_rx) = bounded::<u64>(1);
        let handle = spawn_stage("double", Doubler { seen: 0 }, in_rx, out_tx).unwrap();
        drop(out_rx);
        // The stage can accept at most a couple of items before it notices.
        for i in 0..4 {
            if in_tx.send(i).is_err() {
                break;
            }
        }
        drop(in_tx);
        let (_, err) = handle.join().unwrap();
        assert!(err.is_none());
    }
}
