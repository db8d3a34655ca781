//! Power-aware routing between local and cloud inference, plus timed
//! comparison experiments with whole-machine power telemetry.

pub mod agent;
pub mod config;
pub mod errors;
pub mod experiments;
pub mod inference;
pub mod models;
pub mod monitoring;
