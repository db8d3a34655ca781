//! Host sensor sampling and sliding-window power estimation
//!
//! [`SystemMonitor`] turns host sensors into immutable [`SystemSnapshot`]s;
//! [`PowerTracker`] keeps a bounded window of them and derives estimates.
//! The tracker depends only on the snapshot type, never on the monitor, so
//! tests feed it synthetic snapshots directly.
//!
//! [`SystemSnapshot`]: crate::models::SystemSnapshot

pub mod power_tracker;
pub mod system_monitor;

pub use power_tracker::PowerTracker;
pub use system_monitor::{spawn_periodic, SnapshotSource, SystemMonitor};
