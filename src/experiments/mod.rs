//! Experiment sessions
//!
//! One session runs up to three lanes (sampling, local inference, cloud
//! inference) for a bounded duration under a single cancellation signal,
//! freezes its raw data once, computes summary statistics once from the
//! frozen data, and persists exactly one document.

pub mod runner;
pub mod session;
pub mod summary;

pub use runner::ExperimentRunner;
pub use session::{load_session, persist_session};
pub use summary::compute_summary;
