//! Session summary statistics
//!
//! Pure functions over frozen session data. Summaries are computed exactly
//! once when a session freezes; reloading a persisted document and calling
//! [`compute_summary`] on its raw data reproduces the stored summary.

use std::collections::BTreeMap;

use crate::models::{
    InferenceRecord, LaneKind, LaneSummary, PowerModel, SessionDocument, SessionSummary,
    SystemSnapshot,
};

/// Compute per-lane statistics from raw samples and records
pub fn compute_summary(
    samples: &[SystemSnapshot],
    per_lane_records: &BTreeMap<LaneKind, Vec<InferenceRecord>>,
    model: &PowerModel,
) -> SessionSummary {
    let lanes = per_lane_records
        .iter()
        .map(|(lane, records)| (*lane, lane_summary(samples, records, model)))
        .collect();
    SessionSummary {
        lanes,
        sample_count: samples.len(),
    }
}

/// Recompute a document's summary from its own raw data
pub fn recompute(document: &SessionDocument) -> SessionSummary {
    compute_summary(
        &document.raw_samples,
        &document.per_lane_records,
        &document.power_model,
    )
}

fn lane_summary(
    samples: &[SystemSnapshot],
    records: &[InferenceRecord],
    model: &PowerModel,
) -> LaneSummary {
    let invocations = records.len();
    let successes = records.iter().filter(|r| r.success).count();
    let success_rate = if invocations == 0 {
        0.0
    } else {
        successes as f64 / invocations as f64
    };

    let mut latencies: Vec<i64> = records.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<i64>() as f64 / latencies.len() as f64)
    };
    let median_latency_ms = median(&latencies);

    // The lane's active interval spans its first call start to its last
    // call end; power is attributed from whole-machine samples inside it.
    let active = records.iter().map(|r| r.started_at).min().zip(
        records.iter().map(|r| r.finished_at).max(),
    );
    let in_interval: Vec<&SystemSnapshot> = match active {
        Some((start, end)) => samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .collect(),
        None => Vec::new(),
    };

    let avg_estimated_watts = if in_interval.is_empty() {
        None
    } else {
        Some(
            in_interval.iter().map(|s| model.watts_for(s)).sum::<f64>()
                / in_interval.len() as f64,
        )
    };

    LaneSummary {
        invocations,
        successes,
        success_rate,
        avg_latency_ms,
        median_latency_ms,
        avg_estimated_watts,
        battery_drain_per_hour: drain_per_hour(&in_interval),
    }
}

fn median(sorted: &[i64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid] as f64)
    } else {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    }
}

/// Extrapolate battery drain from the earliest and latest battery-bearing
/// samples in the interval; `None` when fewer than two exist
fn drain_per_hour(samples: &[&SystemSnapshot]) -> Option<f64> {
    let first = samples
        .iter()
        .find_map(|s| s.battery_percent.map(|b| (s.timestamp, b)))?;
    let last = samples
        .iter()
        .rev()
        .find_map(|s| s.battery_percent.map(|b| (s.timestamp, b)))?;
    let elapsed_secs = (last.0 - first.0).num_milliseconds() as f64 / 1000.0;
    if elapsed_secs <= 0.0 {
        return None;
    }
    Some((first.1 - last.1) / elapsed_secs * 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn model() -> PowerModel {
        PowerModel {
            baseline_idle_watts: 5.0,
            max_cpu_watts: 20.0,
        }
    }

    #[test]
    fn all_failing_lane_reports_zero_success_rate() {
        let start = Utc::now();
        let records = vec![
            InferenceRecord::failure(
                "p",
                crate::errors::FailureKind::Network,
                "down".to_string(),
                start,
                start + Duration::milliseconds(10),
            ),
            InferenceRecord::failure(
                "p",
                crate::errors::FailureKind::Timeout,
                "slow".to_string(),
                start + Duration::milliseconds(20),
                start + Duration::milliseconds(50),
            ),
        ];
        let mut per_lane = BTreeMap::new();
        per_lane.insert(LaneKind::Cloud, records);
        let summary = compute_summary(&[], &per_lane, &model());
        let cloud = &summary.lanes[&LaneKind::Cloud];
        assert_eq!(cloud.invocations, 2);
        assert_eq!(cloud.success_rate, 0.0);
        assert!(cloud.avg_latency_ms.is_some());
    }

    #[test]
    fn median_splits_even_and_odd_counts() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[10]), Some(10.0));
        assert_eq!(median(&[10, 20]), Some(15.0));
        assert_eq!(median(&[10, 20, 40]), Some(20.0));
    }

    #[test]
    fn watts_are_averaged_only_over_the_active_interval() {
        let base = Utc::now();
        let snapshot = |offset_secs: i64, cpu: f64| SystemSnapshot {
            timestamp: base + Duration::seconds(offset_secs),
            battery_percent: None,
            cpu_percent: cpu,
            memory_percent: 0.0,
            temperature_celsius: None,
        };
        // Samples outside the record interval must not contribute.
        let samples = vec![snapshot(-10, 100.0), snapshot(1, 50.0), snapshot(20, 100.0)];
        let records = vec![InferenceRecord::success(
            "p",
            "r",
            base,
            base + Duration::seconds(2),
        )];
        let mut per_lane = BTreeMap::new();
        per_lane.insert(LaneKind::Local, records);
        let summary = compute_summary(&samples, &per_lane, &model());
        let watts = summary.lanes[&LaneKind::Local].avg_estimated_watts.unwrap();
        // Only the 50% CPU sample lies inside: 5 + 0.5 * 20
        assert!((watts - 15.0).abs() < 1e-9);
    }

    #[test]
    fn drain_needs_two_battery_samples() {
        let base = Utc::now();
        let with_battery = |offset: i64, battery: Option<f64>| SystemSnapshot {
            timestamp: base + Duration::seconds(offset),
            battery_percent: battery,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            temperature_celsius: None,
        };
        let one = [&with_battery(0, Some(80.0))];
        assert_eq!(drain_per_hour(&one), None);

        let s0 = with_battery(0, Some(80.0));
        let s1 = with_battery(3600, Some(78.0));
        let two = [&s0, &s1];
        assert!((drain_per_hour(&two).unwrap() - 2.0).abs() < 1e-9);
    }
}
