//! Centralized error handling for the edge-optimizer application
//!
//! This module provides the error types for all application layers with a
//! clear non-fatal/fatal split:
//!
//! - **Configuration errors**: fatal, rejected before any session starts
//! - **Monitor errors**: a missing sensor omits its field, never fails a sample
//! - **Tracker errors**: estimate/drain metrics are deferred or omitted
//! - **Executor errors**: captured per call into inference records
//!
//! # Usage
//!
//! ```rust
//! use edge_optimizer::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for power tracker Results
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Convenience type alias for local executor Results
pub type LocalResult<T> = Result<T, LocalError>;

/// Convenience type alias for cloud executor Results
pub type CloudResult<T> = Result<T, CloudError>;
