//! Roster Ingest configuration loading and validation.
//!
//! This crate provides:
//! - The typed `IngestConfig` with defaults for every tunable
//! - Config resolution (CLI overrides → environment → defaults)
//! - Semantic validation (rejects zero batch sizes, zero thresholds, ...)
//!
//! Resolution reads from an explicit variable map so tests never mutate the
//! process environment; `resolve_env` is the thin shim over `std::env`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use ri_common::{Error, Result};

/// Default batch capacity B.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default memory-pressure threshold in MB.
pub const DEFAULT_MAX_MEMORY_MB: f64 = 512.0;

/// Default memory sampling interval in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;

/// Default trailing window of retained memory samples.
pub const DEFAULT_SAMPLE_WINDOW: usize = 120;

/// Default throttle delay per admitted record, in milliseconds.
pub const DEFAULT_THROTTLE_DELAY_MS: u64 = 10;

/// Hysteresis release level as a fraction of the trigger threshold.
pub const RELEASE_FRACTION: f64 = 0.8;

/// Recognized environment variables.
pub const ENV_BATCH_SIZE: &str = "BATCH_SIZE";
pub const ENV_MAX_MEMORY_MB: &str = "MAX_MEMORY_USAGE_MB";
pub const ENV_MONITOR_INTERVAL_MS: &str = "MEMORY_MONITOR_INTERVAL_MS";
pub const ENV_DISABLE_MONITOR: &str = "DISABLE_MEMORY_MONITOR";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Batch capacity B.
    pub batch_size: usize,

    /// Memory-pressure trigger threshold (heap-used MB).
    pub max_memory_mb: f64,

    /// Memory sampling interval.
    pub monitor_interval_ms: u64,

    /// Skip the memory monitor entirely.
    pub disable_memory_monitor: bool,

    /// Trailing window of retained memory samples.
    pub sample_window: usize,

    /// Delay injected per record while throttling.
    pub throttle_delay_ms: u64,

    /// Drop invalid records before batching. When false, invalid records
    /// flow into batches for separate handling downstream.
    pub filter_invalid: bool,

    /// Capacity of the record hand-off channels between stages.
    pub record_queue_depth: usize,

    /// Capacity of the batch hand-off channel in front of the writer.
    pub batch_queue_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            disable_memory_monitor: false,
            sample_window: DEFAULT_SAMPLE_WINDOW,
            throttle_delay_ms: DEFAULT_THROTTLE_DELAY_MS,
            filter_invalid: true,
            record_queue_depth: 2 * DEFAULT_BATCH_SIZE,
            batch_queue_depth: 2,
        }
    }
}

/// Overrides from the CLI layer; `None` means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub batch_size: Option<usize>,
    pub max_memory_mb: Option<f64>,
    pub monitor_interval_ms: Option<u64>,
    pub disable_memory_monitor: Option<bool>,
    pub filter_invalid: Option<bool>,
}

impl IngestConfig {
    /// Hysteresis release level: the monitor leaves the throttling state only
    /// once heap-used drops below this.
    pub fn release_memory_mb(&self) -> f64 {
        self.max_memory_mb * RELEASE_FRACTION
    }

    /// Semantic validation; all violations are configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }
        if !(self.max_memory_mb > 0.0) {
            return Err(Error::Config(
                "memory threshold must be a positive number of MB".into(),
            ));
        }
        if self.monitor_interval_ms == 0 && !self.disable_memory_monitor {
            return Err(Error::Config(
                "memory monitor interval must be at least 1 ms".into(),
            ));
        }
        if self.record_queue_depth == 0 || self.batch_queue_depth == 0 {
            return Err(Error::Config("queue depths must be at least 1".into()));
        }
        Ok(())
    }
}

/// Resolve configuration: CLI overrides win, then environment, then defaults.
/// Reads the process environment; see [`resolve_from`] for the pure form.
pub fn resolve_env(overrides: &ConfigOverrides) -> Result<IngestConfig> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    resolve_from(overrides, &vars)
}

/// Pure resolution from an explicit variable map.
pub fn resolve_from(
    overrides: &ConfigOverrides,
    vars: &HashMap<String, String>,
) -> Result<IngestConfig> {
    let mut cfg = IngestConfig::default();

    if let Some(v) = env_parsed::<usize>(vars, ENV_BATCH_SIZE)? {
        cfg.batch_size = v;
    }
    if let Some(v) = env_parsed::<f64>(vars, ENV_MAX_MEMORY_MB)? {
        cfg.max_memory_mb = v;
    }
    if let Some(v) = env_parsed::<u64>(vars, ENV_MONITOR_INTERVAL_MS)? {
        cfg.monitor_interval_ms = v;
    }
    if let Some(v) = vars.get(ENV_DISABLE_MONITOR) {
        cfg.disable_memory_monitor = is_truthy(v);
    }

    if let Some(v) = overrides.batch_size {
        cfg.batch_size = v;
    }
    if let Some(v) = overrides.max_memory_mb {
        cfg.max_memory_mb = v;
    }
    if let Some(v) = overrides.monitor_interval_ms {
        cfg.monitor_interval_ms = v;
    }
    if let Some(v) = overrides.disable_memory_monitor {
        cfg.disable_memory_monitor = v;
    }
    if let Some(v) = overrides.filter_invalid {
        cfg.filter_invalid = v;
    }

    // Keep the record queue proportional to the batch size so a single batch
    // in flight never starves the batcher.
    cfg.record_queue_depth = (2 * cfg.batch_size).max(1);

    cfg.validate()?;
    Ok(cfg)
}

fn env_parsed<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    match vars.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::Config(format!("invalid value for {key}: {raw:?}"))
        }),
    }
}

/// Lenient boolean env parsing: `1`, `true`, `yes` (case-insensitive) are
/// true, everything else false.
fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = resolve_from(&ConfigOverrides::default(), &HashMap::new()).unwrap();
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.max_memory_mb, DEFAULT_MAX_MEMORY_MB);
        assert_eq!(cfg.monitor_interval_ms, DEFAULT_MONITOR_INTERVAL_MS);
        assert!(!cfg.disable_memory_monitor);
        assert!(cfg.filter_invalid);
    }

    #[test]
    fn env_vars_override_defaults() {
        let cfg = resolve_from(
            &ConfigOverrides::default(),
            &vars(&[
                (ENV_BATCH_SIZE, "250"),
                (ENV_MAX_MEMORY_MB, "64"),
                (ENV_MONITOR_INTERVAL_MS, "50"),
                (ENV_DISABLE_MONITOR, "true"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 250);
        assert_eq!(cfg.max_memory_mb, 64.0);
        assert_eq!(cfg.monitor_interval_ms, 50);
        assert!(cfg.disable_memory_monitor);
        assert_eq!(cfg.record_queue_depth, 500);
    }

    #[test]
    fn cli_overrides_win_over_env() {
        let cfg = resolve_from(
            &ConfigOverrides {
                batch_size: Some(10),
                ..Default::default()
            },
            &vars(&[(ENV_BATCH_SIZE, "250")]),
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 10);
    }

    #[test]
    fn invalid_numeric_env_is_config_error() {
        let err = resolve_from(
            &ConfigOverrides::default(),
            &vars(&[(ENV_BATCH_SIZE, "lots")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = resolve_from(
            &ConfigOverrides {
                batch_size: Some(0),
                ..Default::default()
            },
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn truthy_forms() {
        for v in ["1", "true", "TRUE", "yes", " Yes "] {
            assert!(is_truthy(v), "{v:?} should be truthy");
        }
        for v in ["0", "false", "no", "", "on"] {
            assert!(!is_truthy(v), "{v:?} should be falsy");
        }
    }

    #[test]
    fn release_level_is_eighty_percent() {
        let cfg = IngestConfig {
            max_memory_mb: 100.0,
            ..Default::default()
        };
        assert!((cfg.release_memory_mb() - 80.0).abs() < 1e-9);
    }
}
