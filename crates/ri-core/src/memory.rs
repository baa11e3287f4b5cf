//! Memory monitoring and the pressure signal.
//!
//! Heap accounting comes from a counting allocator wrapped around the system
//! allocator (installed by the binary via `#[global_allocator]`); resident
//! set size is read from `/proc/self/status` on Linux. A dedicated monitor
//! thread samples at a fixed interval, keeps a bounded trailing window for
//! reporting, and drives a hysteretic on/off throttle flag that the pipeline
//! reads lock-free. Neither side ever blocks on the other.

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ri_common::{MemorySample, Result};
use ri_config::IngestConfig;

const MB: f64 = 1024.0 * 1024.0;

static HEAP_USED: AtomicUsize = AtomicUsize::new(0);
static HEAP_PEAK: AtomicUsize = AtomicUsize::new(0);

/// Counting wrapper over the system allocator. Tracks live and peak heap
/// bytes; the binary installs it as the global allocator.
pub struct CountingAlloc;

// SAFETY: delegates all allocation to `System`; only bookkeeping is added.
unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        HEAP_USED.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            HEAP_USED.fetch_sub(layout.size(), Ordering::Relaxed);
            record_alloc(new_size);
        }
        new_ptr
    }
}

fn record_alloc(size: usize) {
    let now = HEAP_USED.fetch_add(size, Ordering::Relaxed) + size;
    HEAP_PEAK.fetch_max(now, Ordering::Relaxed);
}

/// Current live heap in MB (0 until the counting allocator is installed).
pub fn heap_used_mb() -> f64 {
    HEAP_USED.load(Ordering::Relaxed) as f64 / MB
}

/// Peak live heap over the process lifetime, in MB.
pub fn heap_peak_mb() -> f64 {
    HEAP_PEAK.load(Ordering::Relaxed) as f64 / MB
}

/// Take one memory sample now.
pub fn sample_now() -> MemorySample {
    MemorySample {
        at: chrono::Utc::now(),
        heap_used_mb: heap_used_mb(),
        heap_total_mb: heap_peak_mb(),
        resident_mb: resident_mb().unwrap_or(0.0),
    }
}

/// Resident set size in MB from `/proc/self/status` (`VmRSS`).
#[cfg(target_os = "linux")]
pub fn resident_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss_kb(&status).map(|kb| kb as f64 / 1024.0)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_mb() -> Option<f64> {
    None
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

// ── Pressure signal ─────────────────────────────────────────────────────

/// One-shot transition event emitted by the hysteresis state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureEvent {
    /// Heap-used crossed above the trigger threshold.
    Exceeded,
    /// Heap-used dropped below the release level.
    Restored,
}

/// Binary pressure state with a trigger/release pair to avoid flapping:
/// turns on above `trigger_mb`, turns off only below `release_mb`.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    trigger_mb: f64,
    release_mb: f64,
    on: bool,
}

impl Hysteresis {
    pub fn new(trigger_mb: f64, release_mb: f64) -> Self {
        Self {
            trigger_mb,
            release_mb,
            on: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Feed one observation; returns the transition if one occurred.
    pub fn observe(&mut self, heap_used_mb: f64) -> Option<PressureEvent> {
        if !self.on && heap_used_mb > self.trigger_mb {
            self.on = true;
            Some(PressureEvent::Exceeded)
        } else if self.on && heap_used_mb < self.release_mb {
            self.on = false;
            Some(PressureEvent::Restored)
        } else {
            None
        }
    }
}

/// Shared throttle flag: single writer (the monitor), lock-free readers
/// (the valve, once per admitted record).
#[derive(Debug, Default)]
pub struct ThrottleState {
    throttling: AtomicBool,
}

impl ThrottleState {
    pub fn is_throttling(&self) -> bool {
        self.throttling.load(Ordering::Relaxed)
    }

    pub fn set(&self, on: bool) {
        self.throttling.store(on, Ordering::Relaxed);
    }
}

// ── Monitor ─────────────────────────────────────────────────────────────

/// Final memory figures for the run report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryReport {
    pub samples_taken: u64,
    pub peak_heap_mb: f64,
    pub mean_heap_mb: f64,
    pub peak_resident_mb: f64,
    /// Times the pressure threshold was crossed upward.
    pub throttle_activations: u64,
}

/// Sampling state: bounded trailing window, running max and mean, and the
/// hysteresis driving the shared throttle flag.
pub struct MemoryMonitor {
    window: VecDeque<MemorySample>,
    window_cap: usize,
    hysteresis: Hysteresis,
    state: Arc<ThrottleState>,
    samples_taken: u64,
    peak_heap_mb: f64,
    peak_resident_mb: f64,
    heap_sum_mb: f64,
    activations: u64,
}

impl MemoryMonitor {
    pub fn new(cfg: &IngestConfig, state: Arc<ThrottleState>) -> Self {
        Self {
            window: VecDeque::with_capacity(cfg.sample_window),
            window_cap: cfg.sample_window.max(1),
            hysteresis: Hysteresis::new(cfg.max_memory_mb, cfg.release_memory_mb()),
            state,
            samples_taken: 0,
            peak_heap_mb: 0.0,
            peak_resident_mb: 0.0,
            heap_sum_mb: 0.0,
            activations: 0,
        }
    }

    /// Record one sample; publishes any throttle transition to the shared
    /// flag and returns it for logging.
    pub fn record(&mut self, sample: MemorySample) -> Option<PressureEvent> {
        self.samples_taken += 1;
        self.heap_sum_mb += sample.heap_used_mb;
        self.peak_heap_mb = self.peak_heap_mb.max(sample.heap_used_mb);
        self.peak_resident_mb = self.peak_resident_mb.max(sample.resident_mb);

        if self.window.len() == self.window_cap {
            self.window.pop_front();
        }
        let heap_used = sample.heap_used_mb;
        self.window.push_back(sample);

        let event = self.hysteresis.observe(heap_used);
        match event {
            Some(PressureEvent::Exceeded) => {
                self.activations += 1;
                self.state.set(true);
            }
            Some(PressureEvent::Restored) => self.state.set(false),
            None => {}
        }
        event
    }

    pub fn window(&self) -> &VecDeque<MemorySample> {
        &self.window
    }

    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            samples_taken: self.samples_taken,
            peak_heap_mb: self.peak_heap_mb,
            mean_heap_mb: if self.samples_taken == 0 {
                0.0
            } else {
                self.heap_sum_mb / self.samples_taken as f64
            },
            peak_resident_mb: self.peak_resident_mb,
            throttle_activations: self.activations,
        }
    }
}

/// Handle to the running monitor thread.
pub struct MonitorHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<MemoryReport>,
    state: Arc<ThrottleState>,
}

impl MonitorHandle {
    /// Spawn the periodic sampling thread.
    pub fn start(cfg: &IngestConfig) -> Result<Self> {
        let state = Arc::new(ThrottleState::default());
        let mut monitor = MemoryMonitor::new(cfg, Arc::clone(&state));
        let interval = Duration::from_millis(cfg.monitor_interval_ms.max(1));
        let threshold = cfg.max_memory_mb;
        let release = cfg.release_memory_mb();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = std::thread::Builder::new()
            .name("ri-memory".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        // Stop requested or handle dropped.
                        _ => break,
                    }
                    let sample = sample_now();
                    debug!(
                        heap_mb = format!("{:.1}", sample.heap_used_mb),
                        resident_mb = format!("{:.1}", sample.resident_mb),
                        "memory sample"
                    );
                    match monitor.record(sample) {
                        Some(PressureEvent::Exceeded) => warn!(
                            threshold_mb = threshold,
                            "memory pressure exceeded, throttling intake"
                        ),
                        Some(PressureEvent::Restored) => info!(
                            release_mb = release,
                            "memory pressure restored, throttling off"
                        ),
                        None => {}
                    }
                }
                monitor.report()
            })?;

        Ok(Self {
            stop_tx,
            thread,
            state,
        })
    }

    /// The shared flag the throttle valve reads.
    pub fn state(&self) -> Arc<ThrottleState> {
        Arc::clone(&self.state)
    }

    /// Stop the sampling timer and collect the final report.
    pub fn stop(self) -> MemoryReport {
        let _ = self.stop_tx.send(());
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => MemoryReport::default(),
        }
    }
}
