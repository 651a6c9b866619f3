//! Telemetry error types

use thiserror::Error;

/// Errors surfaced to callers of the telemetry API
///
/// Only contract violations on directly-invoked hot paths produce an error.
/// Everything internal to the pipeline is logged and counted instead; the
/// library never propagates its own failures into the host application.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A caller-supplied argument violated the contract (empty name,
    /// negative counter increment, out-of-range sampling rate, malformed id)
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter
        argument: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Operation attempted on a worker or sink that was already disposed
    #[error("{component} has been disposed")]
    ObjectDisposed {
        /// The disposed component
        component: &'static str,
    },

    /// Failed to initialize the telemetry runtime
    #[error("failed to initialize telemetry: {0}")]
    InitializationFailed(String),

    /// Invalid configuration document or value
    #[error("invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// A sink rejected a record. Logged and counted by the worker, never
    /// propagated to other sinks or to the producer
    #[error("sink `{sink}` failed: {reason}")]
    SinkFailure {
        /// Name of the failing sink
        sink: String,
        /// What went wrong
        reason: String,
    },
}

impl TelemetryError {
    /// Shorthand for an [`TelemetryError::InvalidArgument`]
    pub fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`TelemetryError::ObjectDisposed`]
    pub fn disposed(component: &'static str) -> Self {
        Self::ObjectDisposed { component }
    }
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
