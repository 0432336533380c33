//! Execution boundary configuration
//!
//! Defaults suit an interactive caller: work goes to a background worker and a lost
//! response is abandoned after ten seconds in favour of local execution. Every setting
//! can be overridden from the environment.

use crate::constants::boundary::{DEFAULT_RESPONSE_TIMEOUT_MS, WORKER_THREAD_NAME};
use crate::constants::grouping::DEFAULT_NUMERIC_BUCKETS;
use crate::error::{PivotError, PivotResult};
use std::time::Duration;

/// Where engine operations run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Dispatch to the background worker thread, falling back on failure
    Worker,
    /// Run everything on the calling thread
    Synchronous,
}

impl ExecutionMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "worker" | "async" | "background" => Some(ExecutionMode::Worker),
            "sync" | "synchronous" | "inline" => Some(ExecutionMode::Synchronous),
            _ => None,
        }
    }
}

/// Configuration for [`crate::boundary::PivotBoundary`]
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Preferred execution mode; `Worker` may still degrade to synchronous at runtime
    pub execution_mode: ExecutionMode,
    /// How long to wait for a worker response before computing locally; `None` waits forever
    pub response_timeout: Option<Duration>,
    /// Bucket count for numeric group-bys that do not name one
    pub default_buckets: usize,
    /// Name of the worker thread
    pub worker_thread_name: String,
    /// Bound on queued requests; `None` for an unbounded queue
    pub channel_capacity: Option<usize>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Worker,
            response_timeout: Some(Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS)),
            default_buckets: DEFAULT_NUMERIC_BUCKETS,
            worker_thread_name: WORKER_THREAD_NAME.to_string(),
            channel_capacity: None,
        }
    }
}

impl BoundaryConfig {
    /// Configuration that never starts a worker
    pub fn synchronous() -> Self {
        Self { execution_mode: ExecutionMode::Synchronous, ..Self::default() }
    }

    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_default_buckets(mut self, buckets: usize) -> Self {
        self.default_buckets = buckets;
        self
    }

    /// Create configuration from environment variables
    ///
    /// - `LATTICE_EXECUTION_MODE`: `worker` or `sync`
    /// - `LATTICE_RESPONSE_TIMEOUT_MS`: milliseconds, `0` to wait forever
    /// - `LATTICE_DEFAULT_BUCKETS`: positive integer
    pub fn from_environment() -> PivotResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BoundaryConfig::from_environment`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> PivotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("LATTICE_EXECUTION_MODE") {
            config.execution_mode = ExecutionMode::parse(&mode).ok_or_else(|| {
                PivotError::configuration("LATTICE_EXECUTION_MODE", &mode, "expected `worker` or `sync`")
            })?;
        }

        if let Some(raw) = lookup("LATTICE_RESPONSE_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                PivotError::configuration("LATTICE_RESPONSE_TIMEOUT_MS", &raw, "expected milliseconds")
            })?;
            config.response_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(raw) = lookup("LATTICE_DEFAULT_BUCKETS") {
            config.default_buckets = raw
                .trim()
                .parse()
                .ok()
                .filter(|buckets: &usize| *buckets > 0)
                .ok_or_else(|| {
                    PivotError::configuration("LATTICE_DEFAULT_BUCKETS", &raw, "expected a positive integer")
                })?;
        }

        Ok(config)
    }

    /// Get a descriptive string for the current configuration
    pub fn description(&self) -> String {
        format!(
            "{:?} mode (timeout: {}, default buckets: {})",
            self.execution_mode,
            self.response_timeout.map_or_else(|| "none".to_string(), |t| format!("{}ms", t.as_millis())),
            self.default_buckets
        )
    }
}
