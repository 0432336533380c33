//! Error handling for the Lattice execution boundary
//!
//! The engine functions themselves never fail: missing fields, missing indexes and
//! malformed values are absorbed as "not active" or coerced. Errors only surface at the
//! execution boundary, where a caller can be told that its answer was superseded or that
//! the configuration it supplied is unusable.

use std::fmt;
use thiserror::Error;

/// Error type for execution boundary operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    /// The worker channel could not be created or failed while carrying a request
    #[error("Transport error: {message}")]
    Transport { message: String, operation: Option<String> },

    /// A result was computed against a store generation that has since been replaced
    #[error("Superseded: request for generation {request_generation} finished after generation {current_generation} was loaded")]
    Superseded { request_generation: u64, current_generation: u64, operation: Option<String> },

    /// The worker did not answer within the configured response timeout
    #[error("Timeout: {operation} got no worker response within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Configuration values that cannot be used
    #[error("Configuration error: {message}")]
    Configuration { message: String, setting: Option<String>, actual: Option<String> },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String, component: Option<String> },
}

impl PivotError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            PivotError::Transport { .. } => "transport",
            PivotError::Superseded { .. } => "superseded",
            PivotError::Timeout { .. } => "timeout",
            PivotError::Configuration { .. } => "configuration",
            PivotError::Internal { .. } => "internal",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PivotError::Transport { .. } => ErrorSeverity::Medium,
            PivotError::Superseded { .. } => ErrorSeverity::Low,
            PivotError::Timeout { .. } => ErrorSeverity::Medium,
            PivotError::Configuration { .. } => ErrorSeverity::High,
            PivotError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Check if the caller can simply reissue the operation
    pub fn is_recoverable(&self) -> bool {
        match self {
            PivotError::Transport { .. } => true, // boundary has fallen back to local execution
            PivotError::Superseded { .. } => true, // reissue against the new store
            PivotError::Timeout { .. } => true,
            PivotError::Configuration { .. } => false,
            PivotError::Internal { .. } => false,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for execution boundary operations
pub type PivotResult<T> = Result<T, PivotError>;

/// Convenience constructors for common error scenarios
impl PivotError {
    /// Create a transport error for a given operation
    pub fn transport(operation: &str, message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), operation: Some(operation.to_string()) }
    }

    /// Create a superseded-generation error
    pub fn superseded(operation: &str, request_generation: u64, current_generation: u64) -> Self {
        Self::Superseded {
            request_generation,
            current_generation,
            operation: Some(operation.to_string()),
        }
    }

    /// Create a response timeout error
    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::Timeout { operation: operation.to_string(), timeout_ms }
    }

    /// Create a configuration error
    pub fn configuration(setting: &str, actual: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            setting: Some(setting.to_string()),
            actual: Some(actual.to_string()),
        }
    }

    /// Create an internal error with component context
    pub fn internal_component(component: &str, message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), component: Some(component.to_string()) }
    }
}
