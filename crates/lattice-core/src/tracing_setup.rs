//! Structured logging setup
//!
//! Library code only emits `tracing` events; binaries, benches and tests that want to see
//! them call [`init_tracing`] once.

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    Pretty,
    /// One JSON object per event
    Json,
}

/// Configuration for the tracing subscriber
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directive string
    pub filter: String,
    pub format: LogFormat,
    /// Include the event target (module path) in output
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "lattice_core=info,warn".to_string(),
            format: LogFormat::Pretty,
            with_target: false,
        }
    }
}

impl TracingConfig {
    /// Create configuration from environment variables
    ///
    /// `LATTICE_LOG` takes an `EnvFilter` directive; `LATTICE_LOG_FORMAT=json` switches
    /// to JSON output.
    pub fn from_environment() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("LATTICE_LOG").unwrap_or(defaults.filter),
            format: match std::env::var("LATTICE_LOG_FORMAT") {
                Ok(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            with_target: defaults.with_target,
        }
    }
}

/// Install a global subscriber; fails if one is already installed
pub fn init_tracing(config: TracingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(config.with_target))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()?,
    }

    info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(TracingConfig::default().filter).is_ok());
    }
}
