//! Power-aware routing agent
//!
//! Evaluation is stateless per call: the agent pulls the latest snapshot
//! and estimate, applies the configured thresholds, and commits to a path.
//! Routing and execution outcome are deliberately decoupled: a failure on
//! the chosen path is recorded as a failed inference, never re-routed or
//! retried, so power measurements reflect the chosen path's actual cost.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{AbsentSensorPolicy, ThresholdsConfig};
use crate::errors::AppResult;
use crate::inference::{CloudExecutor, LocalExecutor};
use crate::models::{
    DecisionReason, InferenceRecord, PowerEstimate, RoutePath, RoutingDecision, SensorKind,
    SystemSnapshot,
};
use crate::monitoring::{PowerTracker, SnapshotSource};

/// Selects the execution path for a single inference request
pub struct EdgeOptimizerAgent {
    thresholds: ThresholdsConfig,
    monitor: Arc<dyn SnapshotSource>,
    tracker: Arc<PowerTracker>,
    local: Arc<LocalExecutor>,
    cloud: Option<Arc<CloudExecutor>>,
    /// Every decision ever made, kept for audit
    decisions: RwLock<Vec<RoutingDecision>>,
}

impl EdgeOptimizerAgent {
    pub fn new(
        thresholds: ThresholdsConfig,
        monitor: Arc<dyn SnapshotSource>,
        tracker: Arc<PowerTracker>,
        local: Arc<LocalExecutor>,
        cloud: Option<Arc<CloudExecutor>>,
    ) -> Self {
        Self {
            thresholds,
            monitor,
            tracker,
            local,
            cloud,
            decisions: RwLock::new(Vec::new()),
        }
    }

    /// Pure routing evaluation against a snapshot
    ///
    /// Local when every threshold check passes; an absent sensor passes
    /// under the `pass` policy and routes off-device under `defer`. When a
    /// check fails the request goes to the cloud if one is configured and
    /// reachable, otherwise it is deferred and not executed.
    pub fn evaluate(
        thresholds: &ThresholdsConfig,
        snapshot: &SystemSnapshot,
        estimate: Option<PowerEstimate>,
        cloud_available: bool,
    ) -> RoutingDecision {
        let mut blocking_reason: Option<DecisionReason> = None;

        match snapshot.battery_percent {
            Some(battery) if battery < thresholds.battery_threshold => {
                blocking_reason = Some(DecisionReason::BatteryBelowThreshold {
                    battery_percent: battery,
                    threshold: thresholds.battery_threshold,
                });
            }
            None if thresholds.absent_sensor_policy == AbsentSensorPolicy::Defer => {
                blocking_reason = Some(DecisionReason::SensorAbsent {
                    sensor: SensorKind::Battery,
                });
            }
            _ => {}
        }

        if blocking_reason.is_none() {
            match snapshot.temperature_celsius {
                Some(temp) if temp >= thresholds.high_temp_limit => {
                    blocking_reason = Some(DecisionReason::TemperatureAboveLimit {
                        temperature_celsius: temp,
                        limit: thresholds.high_temp_limit,
                    });
                }
                None if thresholds.absent_sensor_policy == AbsentSensorPolicy::Defer => {
                    blocking_reason = Some(DecisionReason::SensorAbsent {
                        sensor: SensorKind::Temperature,
                    });
                }
                _ => {}
            }
        }

        let (path, reason) = match blocking_reason {
            None => (
                RoutePath::Local,
                DecisionReason::ChecksPassed {
                    battery_sensor_absent: snapshot.battery_percent.is_none(),
                    temperature_sensor_absent: snapshot.temperature_celsius.is_none(),
                },
            ),
            Some(reason) if cloud_available => (RoutePath::Cloud, reason),
            Some(reason) => (RoutePath::Deferred, reason),
        };

        RoutingDecision {
            timestamp: Utc::now(),
            path,
            reason,
            cloud_available,
            snapshot: snapshot.clone(),
            estimate,
        }
    }

    /// Decide on the latest system state and record the decision
    pub async fn decide(&self) -> RoutingDecision {
        let snapshot = match self.tracker.latest().await {
            Some(snapshot) => snapshot,
            None => self.monitor.sample().await,
        };
        let estimate = self.tracker.estimate().await.ok();
        let decision = Self::evaluate(
            &self.thresholds,
            &snapshot,
            estimate,
            self.cloud.is_some(),
        );
        info!(
            "Routing decision: {} ({})",
            decision.path, decision.reason
        );
        self.decisions.write().await.push(decision.clone());
        decision
    }

    /// Route one request and execute it on the chosen path
    ///
    /// Returns the decision and, unless the request was deferred, the
    /// record of the call. Execution failures are recorded, never retried.
    pub async fn run_request(
        &self,
        prompt: &str,
    ) -> AppResult<(RoutingDecision, Option<InferenceRecord>)> {
        let decision = self.decide().await;
        let started_at = Utc::now();

        let record = match decision.path {
            RoutePath::Local => {
                let outcome = self.local.infer(prompt).await;
                Some(match outcome {
                    Ok(text) => InferenceRecord::success(prompt, &text, started_at, Utc::now()),
                    Err(e) => InferenceRecord::failure(
                        prompt,
                        (&e).into(),
                        e.to_string(),
                        started_at,
                        Utc::now(),
                    ),
                })
            }
            RoutePath::Cloud => {
                let cloud = self.cloud.as_ref().ok_or_else(|| {
                    crate::errors::AppError::internal("routed to cloud with no cloud executor")
                })?;
                let outcome = cloud.infer(prompt).await;
                Some(match outcome {
                    Ok(text) => InferenceRecord::success(prompt, &text, started_at, Utc::now()),
                    Err(e) => InferenceRecord::failure(
                        prompt,
                        (&e).into(),
                        e.to_string(),
                        started_at,
                        Utc::now(),
                    ),
                })
            }
            RoutePath::Deferred => {
                debug!("Request deferred, not executed: {}", decision.reason);
                None
            }
        };

        Ok((decision, record))
    }

    /// The audit log of every decision made by this agent
    pub async fn decision_log(&self) -> Vec<RoutingDecision> {
        self.decisions.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(policy: AbsentSensorPolicy) -> ThresholdsConfig {
        ThresholdsConfig {
            battery_threshold: 20.0,
            high_temp_limit: 70.0,
            absent_sensor_policy: policy,
        }
    }

    fn snapshot(battery: Option<f64>, temp: Option<f64>) -> SystemSnapshot {
        SystemSnapshot {
            timestamp: Utc::now(),
            battery_percent: battery,
            cpu_percent: 30.0,
            memory_percent: 40.0,
            temperature_celsius: temp,
        }
    }

    #[test]
    fn low_battery_routes_to_cloud_when_available() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Pass),
            &snapshot(Some(15.0), Some(50.0)),
            None,
            true,
        );
        assert_eq!(decision.path, RoutePath::Cloud);
        assert!(matches!(
            decision.reason,
            DecisionReason::BatteryBelowThreshold { .. }
        ));
    }

    #[test]
    fn healthy_battery_and_temperature_route_local() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Pass),
            &snapshot(Some(80.0), Some(50.0)),
            None,
            true,
        );
        assert_eq!(decision.path, RoutePath::Local);
    }

    #[test]
    fn absent_sensors_pass_under_the_default_policy() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Pass),
            &snapshot(None, None),
            None,
            true,
        );
        assert_eq!(decision.path, RoutePath::Local);
        assert_eq!(
            decision.reason,
            DecisionReason::ChecksPassed {
                battery_sensor_absent: true,
                temperature_sensor_absent: true,
            }
        );
    }

    #[test]
    fn absent_sensor_defers_off_device_under_the_conservative_policy() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Defer),
            &snapshot(None, Some(50.0)),
            None,
            true,
        );
        assert_eq!(decision.path, RoutePath::Cloud);
        assert_eq!(
            decision.reason,
            DecisionReason::SensorAbsent {
                sensor: SensorKind::Battery
            }
        );
    }

    #[test]
    fn failed_check_without_cloud_defers_the_request() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Pass),
            &snapshot(Some(5.0), Some(50.0)),
            None,
            false,
        );
        assert_eq!(decision.path, RoutePath::Deferred);
    }

    #[test]
    fn hot_machine_routes_off_device() {
        let decision = EdgeOptimizerAgent::evaluate(
            &thresholds(AbsentSensorPolicy::Pass),
            &snapshot(Some(90.0), Some(85.0)),
            None,
            true,
        );
        assert_eq!(decision.path, RoutePath::Cloud);
        assert!(matches!(
            decision.reason,
            DecisionReason::TemperatureAboveLimit { .. }
        ));
    }
}
