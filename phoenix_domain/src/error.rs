//! Domain error type shared by every processor, the governor and the safety
//! monitor.
//!
//! All fallible domain operations return `Result<T, PhoenixError>`. Only
//! [`PhoenixError::InvariantViolation`] is fatal to the pipeline task; every
//! other variant is reported to its caller and counted, never bubbled up as a
//! panic.

use thiserror::Error;

/// Errors produced by the Phoenix domain layer.
#[derive(Debug, Error)]
pub enum PhoenixError {
    /// Malformed policy, unknown parameter path, regex compile failure, or a
    /// numeric bound violation discovered while validating a patch or a
    /// policy document.
    #[error("config error: {0}")]
    ConfigError(String),

    /// A parameter path that does not exist on the target processor.
    #[error("unknown parameter '{0}' on processor '{1}'")]
    UnknownParameter(String, String),

    /// A value that fails its declared `[min, max]` bound, or a type that
    /// cannot be coerced into the parameter's declared type.
    #[error("value out of bounds for '{parameter}': {value} not in [{min}, {max}]")]
    OutOfBounds {
        parameter: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A regex rule failed to compile; the rule set is left unchanged.
    #[error("invalid regex in rule set: {0}")]
    InvalidRegex(String),

    /// Self-telemetry could not be read, or an exporter was not ready.
    /// Recovered locally by retrying on the next tick.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// A patch was rejected by validation, cooldown, rate limiting,
    /// safe-mode, or a bounds check.
    #[error("patch rejected: {0}")]
    PatchRejected(String),

    /// An internal contract was broken (a sketch became corrupted, a
    /// registry lookup that must succeed did not). Fatal: the process
    /// enters safe mode and the pipeline task exits.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Failure internal to the metrics service (duplicate registration,
    /// encoding failure).
    #[error("metrics error: {0}")]
    MetricsError(String),
}

impl PhoenixError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }
}
