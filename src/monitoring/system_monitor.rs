//! Host sensor sampling
//!
//! A shared `sysinfo::System` behind a lock provides CPU and memory
//! readings; temperature comes from the thermal component list and battery
//! percent from sysfs (`sysinfo` exposes no battery API). A sensor that
//! cannot be read on this host omits only its own field, `sample()` itself
//! never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Components, System};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::MonitorError;
use crate::models::SystemSnapshot;

/// Sysfs battery capacity locations, first match wins
const BATTERY_CAPACITY_PATHS: &[&str] = &[
    "/sys/class/power_supply/BAT0/capacity",
    "/sys/class/power_supply/BAT1/capacity",
];

/// Anything that can produce a system snapshot
///
/// The seam between the runner/agent and the host: production code uses
/// [`SystemMonitor`], tests inject synthetic sources.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn sample(&self) -> SystemSnapshot;
}

/// Samples host sensors into immutable snapshots
///
/// The `sysinfo::System` instance is kept across samples so CPU utilization
/// is derived from the delta since the previous refresh. Concurrent callers
/// share no mutable state beyond that internally locked instance.
pub struct SystemMonitor {
    system: Arc<RwLock<System>>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            system: Arc::new(RwLock::new(System::new())),
        }
    }

    /// Read CPU and memory utilization from the shared system instance
    async fn read_cpu_memory(&self) -> (f64, f64) {
        let mut sys = self.system.write().await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        let cpu = f64::from(sys.global_cpu_usage());
        let memory = if sys.total_memory() == 0 {
            0.0
        } else {
            (sys.used_memory() as f64 / sys.total_memory() as f64) * 100.0
        };
        (cpu, memory)
    }

    /// Mean temperature across all thermal components reporting a value
    fn read_temperature() -> Result<f64, MonitorError> {
        let components = Components::new_with_refreshed_list();
        let temps: Vec<f64> = components
            .iter()
            .filter_map(|c| c.temperature().map(f64::from))
            .collect();
        if temps.is_empty() {
            return Err(MonitorError::SensorUnavailable {
                sensor: "temperature",
            });
        }
        Ok(temps.iter().sum::<f64>() / temps.len() as f64)
    }

    /// Battery percent from sysfs
    fn read_battery_percent() -> Result<f64, MonitorError> {
        for path in BATTERY_CAPACITY_PATHS {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if let Ok(percent) = contents.trim().parse::<f64>() {
                    return Ok(percent);
                }
            }
        }
        Err(MonitorError::SensorUnavailable { sensor: "battery" })
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for SystemMonitor {
    async fn sample(&self) -> SystemSnapshot {
        let (cpu_percent, memory_percent) = self.read_cpu_memory().await;

        let battery_percent = match Self::read_battery_percent() {
            Ok(percent) => Some(percent),
            Err(e) => {
                trace!("Omitting battery field: {}", e);
                None
            }
        };
        let temperature_celsius = match Self::read_temperature() {
            Ok(temp) => Some(temp),
            Err(e) => {
                trace!("Omitting temperature field: {}", e);
                None
            }
        };

        SystemSnapshot {
            timestamp: Utc::now(),
            battery_percent,
            cpu_percent,
            memory_percent,
            temperature_celsius,
        }
    }
}

/// Spawn a periodic sampling task feeding a bounded channel
///
/// The task observes `token` within one interval and closes the channel on
/// cancellation. Calling this again with a fresh token restarts the stream.
pub fn spawn_periodic(
    source: Arc<dyn SnapshotSource>,
    period: Duration,
    token: CancellationToken,
) -> mpsc::Receiver<SystemSnapshot> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so snapshots are spaced by
        // the full period from the start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = source.sample().await;
                    if tx.send(snapshot).await.is_err() {
                        debug!("Snapshot receiver dropped, stopping periodic sampling");
                        break;
                    }
                }
                _ = token.cancelled() => {
                    debug!("Periodic sampling received cancellation signal");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource;

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn sample(&self) -> SystemSnapshot {
            SystemSnapshot {
                timestamp: Utc::now(),
                battery_percent: Some(50.0),
                cpu_percent: 10.0,
                memory_percent: 20.0,
                temperature_celsius: None,
            }
        }
    }

    #[tokio::test]
    async fn sample_never_fails_for_missing_sensors() {
        // On hosts without battery or thermal sensors the fields are simply
        // absent; the call still yields a snapshot.
        let monitor = SystemMonitor::new();
        let snapshot = monitor.sample().await;
        assert!(snapshot.cpu_percent >= 0.0);
        assert!(snapshot.memory_percent >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sampling_spaces_snapshots_and_stops_on_cancel() {
        let token = CancellationToken::new();
        let mut rx = spawn_periodic(
            Arc::new(FixedSource),
            Duration::from_secs(1),
            token.clone(),
        );

        let first = rx.recv().await.expect("first snapshot");
        let second = rx.recv().await.expect("second snapshot");
        assert!(second.timestamp >= first.timestamp);

        token.cancel();
        // Channel closes once the task observes cancellation.
        while rx.recv().await.is_some() {}
    }
}
