//! # Engine configuration.
//!
//! [`Config`] defines the engine's behavior: parallel dispatch, worker
//! cap, default execution mode and child ordering, per-test timeout,
//! unwind grace, output capture, and the discovery severity threshold.
//!
//! The engine never loads configuration itself; the host resolves it and
//! hands over a read-only [`ConfigParameters`] map, from which
//! [`Config::from_parameters`] picks the keys it understands.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use testvisor::{Config, ExecutionMode};
//!
//! let mut cfg = Config::default();
//! cfg.parallel = true;
//! cfg.max_workers = 4;
//! cfg.default_mode = ExecutionMode::Concurrent;
//! cfg.timeout = Duration::from_secs(30);
//!
//! assert_eq!(cfg.concurrency_limit(), Some(4));
//! assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(30)));
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::Severity;
use crate::locks::ExecutionMode;

/// Strategy used to order a container's children before ordering
/// extensions run, selected by name via `testvisor.ordering.default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// Keep discovery order.
    Declaration,
    /// Sort by display name.
    Alphanumeric,
    /// Shuffle; surfaces inter-test ordering dependencies.
    Random,
}

impl OrderingStrategy {
    /// Parses a strategy from its lowercase configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "declaration" => Some(OrderingStrategy::Declaration),
            "alphanumeric" => Some(OrderingStrategy::Alphanumeric),
            "random" => Some(OrderingStrategy::Random),
            _ => None,
        }
    }
}

/// Read-only configuration-parameter lookup supplied by the host.
///
/// The engine only ever calls [`get`](Self::get); the typed helpers exist
/// for [`Config::from_parameters`].
#[derive(Debug, Clone, Default)]
pub struct ConfigParameters {
    values: HashMap<String, String>,
}

impl ConfigParameters {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Looks up a raw value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn get_secs(&self, key: &str) -> Option<Duration> {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
    }
}

/// Global configuration for one engine run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether sibling subtrees may be dispatched concurrently at all.
    pub parallel: bool,
    /// Maximum number of concurrently executing nodes (0 = unlimited).
    pub max_workers: usize,
    /// Execution mode for nodes that do not declare one.
    pub default_mode: ExecutionMode,
    /// Child ordering applied before ordering extensions run.
    pub ordering: OrderingStrategy,
    /// Per-test timeout for nodes that do not declare one (0 = none).
    pub timeout: Duration,
    /// How long to wait for a cancelled body to unwind cooperatively.
    pub grace: Duration,
    /// Capture writes to the intercepted stdout stream.
    pub capture_stdout: bool,
    /// Capture writes to the intercepted stderr stream.
    pub capture_stderr: bool,
    /// Per-capture buffer cap; oldest bytes are evicted first.
    pub max_capture_bytes: usize,
    /// Discovery issues at or above this severity abort their root.
    pub critical_severity: Severity,
    /// Root for per-node output directories (unset = none requested).
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `parallel = false`, `max_workers = 0` (unlimited)
    /// - `default_mode = Serial`, `ordering = Declaration`
    /// - `timeout = 0s` (none), `grace = 5s`
    /// - capture disabled, `max_capture_bytes = 4 MiB`
    /// - `critical_severity = Error`, no output directory
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: 0,
            default_mode: ExecutionMode::Serial,
            ordering: OrderingStrategy::Declaration,
            timeout: Duration::from_secs(0),
            grace: Duration::from_secs(5),
            capture_stdout: false,
            capture_stderr: false,
            max_capture_bytes: 4 * 1024 * 1024,
            critical_severity: Severity::Error,
            output_dir: None,
        }
    }
}

impl Config {
    /// Builds a config from the host-supplied parameter map; keys the map
    /// does not carry keep their [`Default`] value.
    pub fn from_parameters(params: &ConfigParameters) -> Self {
        let defaults = Config::default();
        Self {
            parallel: params
                .get_bool("testvisor.parallel.enabled")
                .unwrap_or(defaults.parallel),
            max_workers: params
                .get_usize("testvisor.parallel.workers")
                .unwrap_or(defaults.max_workers),
            default_mode: params
                .get("testvisor.mode.default")
                .and_then(ExecutionMode::from_name)
                .unwrap_or(defaults.default_mode),
            ordering: params
                .get("testvisor.ordering.default")
                .and_then(OrderingStrategy::from_name)
                .unwrap_or(defaults.ordering),
            timeout: params
                .get_secs("testvisor.timeout.default")
                .unwrap_or(defaults.timeout),
            grace: params
                .get_secs("testvisor.grace")
                .unwrap_or(defaults.grace),
            capture_stdout: params
                .get_bool("testvisor.capture.stdout")
                .unwrap_or(defaults.capture_stdout),
            capture_stderr: params
                .get_bool("testvisor.capture.stderr")
                .unwrap_or(defaults.capture_stderr),
            max_capture_bytes: params
                .get_usize("testvisor.capture.max-bytes")
                .unwrap_or(defaults.max_capture_bytes),
            critical_severity: params
                .get("testvisor.discovery.critical-severity")
                .and_then(Severity::from_name)
                .unwrap_or(defaults.critical_severity),
            output_dir: params.get("testvisor.output.dir").map(PathBuf::from),
        }
    }

    /// The default per-test timeout; `0s` in config means none.
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// The worker cap; `0` in config means unlimited.
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self.max_workers {
            0 => None,
            n => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_zero_means_none() {
        let cfg = Config::default();
        assert_eq!(cfg.default_timeout(), None);
        let mut cfg = cfg;
        cfg.timeout = Duration::from_secs(7);
        assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_from_parameters_reads_known_keys() {
        let params = ConfigParameters::from_pairs([
            ("testvisor.parallel.enabled", "true"),
            ("testvisor.parallel.workers", "8"),
            ("testvisor.mode.default", "concurrent"),
            ("testvisor.ordering.default", "alphanumeric"),
            ("testvisor.timeout.default", "30"),
            ("testvisor.discovery.critical-severity", "warning"),
        ]);
        let cfg = Config::from_parameters(&params);
        assert!(cfg.parallel);
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.default_mode, ExecutionMode::Concurrent);
        assert_eq!(cfg.ordering, OrderingStrategy::Alphanumeric);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.critical_severity, Severity::Warning);
    }

    #[test]
    fn test_from_parameters_ignores_unknown_values() {
        let params = ConfigParameters::from_pairs([
            ("testvisor.mode.default", "sideways"),
            ("testvisor.parallel.workers", "not-a-number"),
        ]);
        let cfg = Config::from_parameters(&params);
        assert_eq!(cfg.default_mode, ExecutionMode::Serial);
        assert_eq!(cfg.max_workers, 0);
    }
}
