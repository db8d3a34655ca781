//! Core data models for the edge-optimizer application
//!
//! Snapshots, power estimates, routing decisions, inference records and the
//! persisted session document. Everything here is a plain serde type; the
//! derived values (latency, estimates, summaries) are computed once at
//! construction or freeze time and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FailureKind;

/// A point-in-time reading of power-relevant host sensors
///
/// A sensor that cannot be read on the host omits only its own field; the
/// snapshot as a whole is always produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Battery charge level 0-100, absent on hosts without a battery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<f64>,
    /// Whole-machine CPU utilization 0-100
    pub cpu_percent: f64,
    /// System memory utilization 0-100
    pub memory_percent: f64,
    /// Mean temperature across available thermal sensors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
}

/// A power estimate derived from the snapshots currently in the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEstimate {
    pub timestamp: DateTime<Utc>,
    /// `baseline_idle_watts + cpu_contribution/100 * max_cpu_watts`
    pub estimated_watts: f64,
    /// Mean CPU utilization over the window, 0-100
    pub cpu_contribution_percent: f64,
    /// Estimated draw above the idle baseline
    pub overhead_watts: f64,
    /// Window fill ratio, 0.0-1.0
    pub confidence: f64,
    /// Set when the window holds fewer than the configured minimum samples
    pub low_confidence: bool,
}

/// Battery drain rate derived from the earliest/latest qualifying samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainRate {
    /// Battery percentage points lost per hour (negative when charging)
    pub percent_per_hour: f64,
    /// Elapsed time between the two samples the rate was derived from
    pub observed_secs: f64,
}

/// The execution path chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePath {
    Local,
    Cloud,
    Deferred,
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePath::Local => write!(f, "local"),
            RoutePath::Cloud => write!(f, "cloud"),
            RoutePath::Deferred => write!(f, "deferred"),
        }
    }
}

/// Which sensor a routing reason refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Battery,
    Temperature,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Battery => write!(f, "battery"),
            SensorKind::Temperature => write!(f, "temperature"),
        }
    }
}

/// Recorded justification for a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// All local-eligibility checks passed; absent sensors are noted so the
    /// audit trail shows which checks were vacuous
    ChecksPassed {
        battery_sensor_absent: bool,
        temperature_sensor_absent: bool,
    },
    /// Battery below the configured threshold
    BatteryBelowThreshold { battery_percent: f64, threshold: f64 },
    /// Temperature at or above the configured limit
    TemperatureAboveLimit {
        temperature_celsius: f64,
        limit: f64,
    },
    /// Conservative absent-sensor policy routed the request off-device
    SensorAbsent { sensor: SensorKind },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::ChecksPassed {
                battery_sensor_absent,
                temperature_sensor_absent,
            } => {
                write!(f, "all checks passed")?;
                if *battery_sensor_absent {
                    write!(f, " (battery sensor absent)")?;
                }
                if *temperature_sensor_absent {
                    write!(f, " (temperature sensor absent)")?;
                }
                Ok(())
            }
            DecisionReason::BatteryBelowThreshold {
                battery_percent,
                threshold,
            } => write!(f, "battery too low: {battery_percent}% < {threshold}%"),
            DecisionReason::TemperatureAboveLimit {
                temperature_celsius,
                limit,
            } => write!(
                f,
                "temperature too high: {temperature_celsius}\u{b0}C >= {limit}\u{b0}C"
            ),
            DecisionReason::SensorAbsent { sensor } => {
                write!(f, "{sensor} sensor absent (conservative policy)")
            }
        }
    }
}

/// One routing decision, kept for audit
///
/// Immutable once created; carries the exact snapshot/estimate it was
/// computed from so a decision can be replayed after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub timestamp: DateTime<Utc>,
    pub path: RoutePath,
    pub reason: DecisionReason,
    /// Whether a cloud path was configured and reachable at decision time
    pub cloud_available: bool,
    pub snapshot: SystemSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<PowerEstimate>,
}

/// Which paths an experiment session exercises
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentMode {
    Local,
    Cloud,
    #[default]
    Both,
}

impl ExperimentMode {
    pub fn includes_local(&self) -> bool {
        matches!(self, ExperimentMode::Local | ExperimentMode::Both)
    }

    pub fn includes_cloud(&self) -> bool {
        matches!(self, ExperimentMode::Cloud | ExperimentMode::Both)
    }
}

impl fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentMode::Local => write!(f, "local"),
            ExperimentMode::Cloud => write!(f, "cloud"),
            ExperimentMode::Both => write!(f, "both"),
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
}

/// An independently scheduled execution path that produces inference records
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LaneKind {
    Local,
    Cloud,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Local => write!(f, "local"),
            LaneKind::Cloud => write!(f, "cloud"),
        }
    }
}

/// One inference call, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub prompt: String,
    /// Response text, truncated for storage; absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Failure classification; absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Derived once from started_at/finished_at
    pub latency_ms: i64,
}

/// Longest response prefix retained in a record
const MAX_STORED_RESPONSE: usize = 200;

impl InferenceRecord {
    /// Build a successful record, deriving latency from the timestamps
    pub fn success(
        prompt: &str,
        response: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let truncated: String = response.chars().take(MAX_STORED_RESPONSE).collect();
        Self {
            prompt: prompt.to_string(),
            response: Some(truncated),
            failure: None,
            error_message: None,
            started_at,
            finished_at,
            success: true,
            latency_ms: (finished_at - started_at).num_milliseconds(),
        }
    }

    /// Build a failed record with its failure classification
    pub fn failure(
        prompt: &str,
        kind: FailureKind,
        message: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            prompt: prompt.to_string(),
            response: None,
            failure: Some(kind),
            error_message: Some(message),
            started_at,
            finished_at,
            success: false,
            latency_ms: (finished_at - started_at).num_milliseconds(),
        }
    }
}

/// The linear CPU-to-watts model a session was recorded under
///
/// Stored inside the session document so summary statistics can be
/// recomputed from raw samples without out-of-band configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerModel {
    pub baseline_idle_watts: f64,
    pub max_cpu_watts: f64,
}

impl PowerModel {
    /// Estimated whole-machine draw for a single snapshot
    pub fn watts_for(&self, snapshot: &SystemSnapshot) -> f64 {
        self.baseline_idle_watts + (snapshot.cpu_percent / 100.0) * self.max_cpu_watts
    }
}

/// Per-lane summary statistics, computed exactly once after freezing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSummary {
    pub invocations: usize,
    pub successes: usize,
    /// 0.0-1.0; 0.0 for a lane that failed every call
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_latency_ms: Option<f64>,
    /// Mean estimated machine draw over the lane's active interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_estimated_watts: Option<f64>,
    /// Extrapolated battery drain, when two qualifying samples exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_drain_per_hour: Option<f64>,
}

/// Whole-session summary: one entry per lane that ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub lanes: BTreeMap<LaneKind, LaneSummary>,
    pub sample_count: usize,
}

/// The persisted output of one experiment session
///
/// Written exactly once, on freeze. `raw_samples` and `per_lane_records`
/// retain everything needed to recompute `summary` bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: Uuid,
    pub mode: ExperimentMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub configured_duration_secs: u64,
    pub sampling_interval_secs: f64,
    pub power_model: PowerModel,
    pub raw_samples: Vec<SystemSnapshot>,
    pub per_lane_records: BTreeMap<LaneKind, Vec<InferenceRecord>>,
    pub summary: SessionSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_record_derives_latency_once() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(340);
        let record = InferenceRecord::success("hi", "hello", start, end);
        assert!(record.success);
        assert_eq!(record.latency_ms, 340);
        assert_eq!(record.failure, None);
    }

    #[test]
    fn inference_record_truncates_long_responses() {
        let start = Utc::now();
        let record = InferenceRecord::success("p", &"x".repeat(500), start, start);
        assert_eq!(record.response.as_ref().map(String::len), Some(200));
    }

    #[test]
    fn power_model_is_linear_in_cpu() {
        let model = PowerModel {
            baseline_idle_watts: 5.0,
            max_cpu_watts: 20.0,
        };
        let snapshot = SystemSnapshot {
            timestamp: Utc::now(),
            battery_percent: None,
            cpu_percent: 50.0,
            memory_percent: 40.0,
            temperature_celsius: None,
        };
        assert!((model.watts_for(&snapshot) - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn lane_kind_serializes_as_map_key() {
        let mut lanes = BTreeMap::new();
        lanes.insert(
            LaneKind::Local,
            LaneSummary {
                invocations: 1,
                successes: 1,
                success_rate: 1.0,
                avg_latency_ms: Some(10.0),
                median_latency_ms: Some(10.0),
                avg_estimated_watts: None,
                battery_drain_per_hour: None,
            },
        );
        let json = serde_json::to_string(&SessionSummary {
            lanes,
            sample_count: 0,
        })
        .unwrap();
        assert!(json.contains("\"local\""));
    }
}
