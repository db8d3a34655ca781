//! Error type definitions for the edge-optimizer application
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that keeps the fatal/non-fatal
//! split explicit: configuration errors abort startup, everything else is
//! absorbed at a component boundary or recorded per call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can surface at the
/// application boundary. It uses `thiserror` to provide automatic error
/// trait implementations and proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors (fatal, startup only)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Power tracker errors
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// Local inference engine errors
    #[error("Local inference error: {0}")]
    Local(#[from] LocalError),

    /// Cloud inference service errors
    #[error("Cloud inference error: {0}")]
    Cloud(#[from] CloudError),

    /// Session persistence I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Sensor read errors, absorbed inside [`SystemMonitor`] as omitted fields
///
/// A single unreadable sensor never fails a whole `sample()` call; these
/// are surfaced only as trace logs and `None` fields.
///
/// [`SystemMonitor`]: crate::monitoring::SystemMonitor
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A sensor could not be read on this host
    #[error("Sensor unavailable: {sensor}")]
    SensorUnavailable { sensor: &'static str },
}

/// Power tracker errors, non-fatal: callers treat the metric as omitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The sample window holds no snapshots yet
    #[error("Insufficient data: the sample window is empty")]
    InsufficientData,

    /// No two battery-bearing samples far enough apart to derive a rate
    #[error("Missing battery sensor: no qualifying battery samples in the window")]
    MissingBatterySensor,
}

/// Local inference engine errors
#[derive(Error, Debug, Clone)]
pub enum LocalError {
    /// Model loading failures
    #[error("Failed to load model '{model_id}': {message}")]
    LoadError { model_id: String, message: String },

    /// Inference execution failures
    #[error("Local inference failed: {message}")]
    InferenceError { message: String },
}

/// Cloud inference service errors
///
/// Exactly the per-call taxonomy recorded into an
/// [`InferenceRecord`](crate::models::InferenceRecord); none of these abort
/// a lane or a session.
#[derive(Error, Debug, Clone)]
pub enum CloudError {
    /// Authentication/authorization failures (401/403)
    #[error("Cloud authentication failed: {message}")]
    AuthError { message: String },

    /// Rate limiting (429)
    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    /// Account quota exhausted
    #[error("Quota exceeded for {provider}")]
    QuotaExceeded { provider: String },

    /// Transport-level failures (DNS, connect, TLS, malformed response)
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// The mandatory per-call timeout elapsed
    #[error("Cloud call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Serializable failure classification stored in an `InferenceRecord`
///
/// This is the flattened, persistence-friendly projection of `LocalError`
/// and `CloudError`, plus the runner-level `Abandoned` kind for in-flight
/// calls that outlived the cancellation grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelLoad,
    LocalInference,
    CloudAuth,
    RateLimited,
    QuotaExceeded,
    Network,
    Timeout,
    /// Call abandoned after the cancellation grace period expired
    Abandoned,
}

impl From<&LocalError> for FailureKind {
    fn from(err: &LocalError) -> Self {
        match err {
            LocalError::LoadError { .. } => FailureKind::ModelLoad,
            LocalError::InferenceError { .. } => FailureKind::LocalInference,
        }
    }
}

impl From<&CloudError> for FailureKind {
    fn from(err: &CloudError) -> Self {
        match err {
            CloudError::AuthError { .. } => FailureKind::CloudAuth,
            CloudError::RateLimited { .. } => FailureKind::RateLimited,
            CloudError::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            CloudError::NetworkError { .. } => FailureKind::Network,
            CloudError::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl CloudError {
    /// Create a network error from any transport-level failure
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
