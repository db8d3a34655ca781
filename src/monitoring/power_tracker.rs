//! Sliding-window power estimation
//!
//! Keeps a bounded, time-ordered window of snapshots and derives a linear
//! CPU-to-watts estimate plus an optional battery drain rate. The tracker
//! never samples anything itself; something else records snapshots into it.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::config::PowerConfig;
use crate::errors::{TrackerError, TrackerResult};
use crate::models::{DrainRate, PowerEstimate, PowerModel, SystemSnapshot};

/// Bounded window of recent snapshots with derived power metrics
///
/// `record` evicts FIFO by arrival beyond capacity; snapshots arrive
/// timestamp-ordered from a single sampling lane and duplicates keep
/// arrival order. An estimate is computed only from snapshots currently in
/// the window.
pub struct PowerTracker {
    window: RwLock<VecDeque<SystemSnapshot>>,
    capacity: usize,
    min_samples: usize,
    drain_min_elapsed_secs: f64,
    model: PowerModel,
}

impl PowerTracker {
    pub fn new(config: &PowerConfig) -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(config.window_capacity)),
            capacity: config.window_capacity,
            min_samples: config.min_samples,
            drain_min_elapsed_secs: config.drain_min_elapsed_secs,
            model: config.power_model(),
        }
    }

    /// Append a snapshot, evicting the oldest entries beyond capacity
    pub async fn record(&self, snapshot: SystemSnapshot) {
        let mut window = self.window.write().await;
        window.push_back(snapshot);
        while window.len() > self.capacity {
            window.pop_front();
        }
        trace!("Recorded snapshot, window now holds {} entries", window.len());
    }

    /// Number of snapshots currently in the window
    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.window.read().await.is_empty()
    }

    /// The most recent snapshot, if any
    pub async fn latest(&self) -> Option<SystemSnapshot> {
        self.window.read().await.back().cloned()
    }

    /// Snapshot of the current window contents, oldest first
    pub async fn window_contents(&self) -> Vec<SystemSnapshot> {
        self.window.read().await.iter().cloned().collect()
    }

    /// Derive a power estimate from the current window
    ///
    /// Fails with `InsufficientData` when the window is empty. Confidence
    /// is the window fill ratio, flagged low below the configured minimum
    /// sample count.
    pub async fn estimate(&self) -> TrackerResult<PowerEstimate> {
        let window = self.window.read().await;
        if window.is_empty() {
            return Err(TrackerError::InsufficientData);
        }

        let mean_cpu =
            window.iter().map(|s| s.cpu_percent).sum::<f64>() / window.len() as f64;
        let estimated_watts =
            self.model.baseline_idle_watts + (mean_cpu / 100.0) * self.model.max_cpu_watts;

        Ok(PowerEstimate {
            timestamp: Utc::now(),
            estimated_watts,
            cpu_contribution_percent: mean_cpu,
            overhead_watts: estimated_watts - self.model.baseline_idle_watts,
            confidence: window.len() as f64 / self.capacity as f64,
            low_confidence: window.len() < self.min_samples,
        })
    }

    /// Battery drain rate from the earliest and latest battery-bearing
    /// snapshots separated by at least the configured minimum elapsed time
    ///
    /// Fails with `MissingBatterySensor` when no two qualifying samples
    /// exist; callers treat this metric as omittable.
    pub async fn drain_rate(&self) -> TrackerResult<DrainRate> {
        let window = self.window.read().await;
        let earliest = window
            .iter()
            .find_map(|s| s.battery_percent.map(|b| (s.timestamp, b)));
        let latest = window
            .iter()
            .rev()
            .find_map(|s| s.battery_percent.map(|b| (s.timestamp, b)));

        match (earliest, latest) {
            (Some((t0, b0)), Some((t1, b1))) => {
                let elapsed_secs = (t1 - t0).num_milliseconds() as f64 / 1000.0;
                if elapsed_secs < self.drain_min_elapsed_secs {
                    return Err(TrackerError::MissingBatterySensor);
                }
                Ok(DrainRate {
                    percent_per_hour: (b0 - b1) / elapsed_secs * 3600.0,
                    observed_secs: elapsed_secs,
                })
            }
            _ => Err(TrackerError::MissingBatterySensor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn tracker_with_capacity(capacity: usize) -> PowerTracker {
        PowerTracker::new(&PowerConfig {
            baseline_idle_watts: 5.0,
            max_cpu_watts: 20.0,
            window_capacity: capacity,
            min_samples: 3,
            drain_min_elapsed_secs: 10.0,
        })
    }

    fn snapshot_at(timestamp: DateTime<Utc>, cpu: f64, battery: Option<f64>) -> SystemSnapshot {
        SystemSnapshot {
            timestamp,
            battery_percent: battery,
            cpu_percent: cpu,
            memory_percent: 40.0,
            temperature_celsius: None,
        }
    }

    #[tokio::test]
    async fn empty_window_yields_insufficient_data() {
        let tracker = tracker_with_capacity(10);
        assert_eq!(
            tracker.estimate().await.unwrap_err(),
            TrackerError::InsufficientData
        );
    }

    #[tokio::test]
    async fn any_nonempty_window_yields_an_estimate() {
        let tracker = tracker_with_capacity(10);
        tracker.record(snapshot_at(Utc::now(), 50.0, None)).await;
        let estimate = tracker.estimate().await.unwrap();
        // 5W baseline + 50% of 20W
        assert!((estimate.estimated_watts - 15.0).abs() < 1e-9);
        assert!((estimate.overhead_watts - 10.0).abs() < 1e-9);
        assert!(estimate.low_confidence);
    }

    #[tokio::test]
    async fn window_keeps_the_k_most_recent_entries() {
        let tracker = tracker_with_capacity(3);
        let base = Utc::now();
        for i in 0..7 {
            tracker
                .record(snapshot_at(base + Duration::seconds(i), i as f64, None))
                .await;
        }
        let contents = tracker.window_contents().await;
        assert_eq!(contents.len(), 3);
        let cpus: Vec<f64> = contents.iter().map(|s| s.cpu_percent).collect();
        assert_eq!(cpus, vec![4.0, 5.0, 6.0]);
    }

    #[tokio::test]
    async fn duplicate_timestamps_keep_arrival_order() {
        let tracker = tracker_with_capacity(5);
        let now = Utc::now();
        tracker.record(snapshot_at(now, 1.0, None)).await;
        tracker.record(snapshot_at(now, 2.0, None)).await;
        let contents = tracker.window_contents().await;
        assert_eq!(contents[0].cpu_percent, 1.0);
        assert_eq!(contents[1].cpu_percent, 2.0);
    }

    #[tokio::test]
    async fn confidence_scales_with_fill_ratio() {
        let tracker = tracker_with_capacity(4);
        let base = Utc::now();
        for i in 0..3 {
            tracker
                .record(snapshot_at(base + Duration::seconds(i), 10.0, None))
                .await;
        }
        let estimate = tracker.estimate().await.unwrap();
        assert!((estimate.confidence - 0.75).abs() < 1e-9);
        assert!(!estimate.low_confidence);
    }

    #[tokio::test]
    async fn drain_rate_requires_two_qualifying_battery_samples() {
        let tracker = tracker_with_capacity(10);
        let base = Utc::now();

        // No battery readings at all.
        tracker.record(snapshot_at(base, 10.0, None)).await;
        assert_eq!(
            tracker.drain_rate().await.unwrap_err(),
            TrackerError::MissingBatterySensor
        );

        // Two readings, but not far enough apart.
        tracker
            .record(snapshot_at(base + Duration::seconds(2), 10.0, Some(80.0)))
            .await;
        tracker
            .record(snapshot_at(base + Duration::seconds(4), 10.0, Some(79.0)))
            .await;
        assert_eq!(
            tracker.drain_rate().await.unwrap_err(),
            TrackerError::MissingBatterySensor
        );

        // A third reading past the minimum separation qualifies.
        tracker
            .record(snapshot_at(base + Duration::seconds(62), 10.0, Some(78.0)))
            .await;
        let rate = tracker.drain_rate().await.unwrap();
        assert!(rate.percent_per_hour > 0.0);
        assert!(rate.observed_secs >= 10.0);
    }
}
