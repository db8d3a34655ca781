//! Concurrent multi-lane experiment orchestration
//!
//! A session forces the configured inference paths to run regardless of
//! what the routing agent would choose, so their power/latency profiles
//! can be compared. Power is sampled once for the whole machine; no
//! attempt is made to attribute draw to a single lane.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{compute_summary, persist_session};
use crate::config::ExperimentConfig;
use crate::errors::{AppError, AppResult, FailureKind};
use crate::inference::{CloudExecutor, LocalExecutor};
use crate::models::{
    ExperimentMode, InferenceRecord, LaneKind, PowerModel, SessionDocument, SessionStatus,
    SystemSnapshot,
};
use crate::monitoring::{spawn_periodic, PowerTracker, SnapshotSource};

/// Shared append-only session state; one mutex serializes all lane appends
#[derive(Default, Clone)]
struct SessionState {
    samples: Vec<SystemSnapshot>,
    records: BTreeMap<LaneKind, Vec<InferenceRecord>>,
}

/// Which executor an inference lane drives
enum LaneExecutor {
    Local(Arc<LocalExecutor>),
    Cloud(Arc<CloudExecutor>),
}

impl LaneExecutor {
    fn kind(&self) -> LaneKind {
        match self {
            LaneExecutor::Local(_) => LaneKind::Local,
            LaneExecutor::Cloud(_) => LaneKind::Cloud,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, (FailureKind, String)> {
        match self {
            LaneExecutor::Local(executor) => executor
                .infer(prompt)
                .await
                .map_err(|e| ((&e).into(), e.to_string())),
            LaneExecutor::Cloud(executor) => executor
                .infer(prompt)
                .await
                .map_err(|e| ((&e).into(), e.to_string())),
        }
    }
}

/// Runs one bounded-duration experiment session
pub struct ExperimentRunner {
    monitor: Arc<dyn SnapshotSource>,
    tracker: Arc<PowerTracker>,
    local: Arc<LocalExecutor>,
    cloud: Option<Arc<CloudExecutor>>,
    config: ExperimentConfig,
    power_model: PowerModel,
}

impl ExperimentRunner {
    pub fn new(
        monitor: Arc<dyn SnapshotSource>,
        tracker: Arc<PowerTracker>,
        local: Arc<LocalExecutor>,
        cloud: Option<Arc<CloudExecutor>>,
        config: ExperimentConfig,
        power_model: PowerModel,
    ) -> Self {
        Self {
            monitor,
            tracker,
            local,
            cloud,
            config,
            power_model,
        }
    }

    /// Run one session to completion or cancellation and persist its document
    ///
    /// `external_token` is the session-level cancellation signal; elapsed
    /// duration cancels internally through a child token so the two stop
    /// conditions share one code path in every lane.
    pub async fn run(
        &self,
        mode: ExperimentMode,
        duration_override: Option<Duration>,
        external_token: CancellationToken,
    ) -> AppResult<(SessionDocument, PathBuf)> {
        if mode.includes_cloud() && self.cloud.is_none() {
            return Err(AppError::configuration(
                "experiment mode requires a cloud path but none is configured",
            ));
        }

        let session_id = Uuid::new_v4();
        let duration =
            duration_override.unwrap_or(Duration::from_secs(self.config.duration_secs));
        let sampling_interval = Duration::from_secs_f64(self.config.sampling_interval_secs);
        let grace = Duration::from_secs_f64(self.config.grace_period_secs);
        let start_time = Utc::now();

        info!(
            "Starting session {} (mode: {}, duration: {:?}, sampling: {:?})",
            session_id, mode, duration, sampling_interval
        );

        // Pre-register one record sequence per configured lane so the
        // frozen document carries an entry even for a lane that never got
        // a call off.
        let mut initial_records = BTreeMap::new();
        if mode.includes_local() {
            initial_records.insert(LaneKind::Local, Vec::new());
        }
        if mode.includes_cloud() {
            initial_records.insert(LaneKind::Cloud, Vec::new());
        }
        let state = Arc::new(Mutex::new(SessionState {
            samples: Vec::new(),
            records: initial_records,
        }));

        let session_token = external_token.child_token();
        let timer_token = session_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    debug!("Session duration elapsed");
                    timer_token.cancel();
                }
                _ = timer_token.cancelled() => {}
            }
        });

        let mut lanes = Vec::new();

        // Sampling lane: one per session, shared by all inference lanes.
        let mut snapshots =
            spawn_periodic(self.monitor.clone(), sampling_interval, session_token.clone());
        let tracker = self.tracker.clone();
        let sampling_state = state.clone();
        lanes.push(tokio::spawn(async move {
            while let Some(snapshot) = snapshots.recv().await {
                tracker.record(snapshot.clone()).await;
                sampling_state.lock().await.samples.push(snapshot);
            }
            debug!("Sampling lane stopped");
        }));

        if mode.includes_local() {
            lanes.push(tokio::spawn(inference_lane(
                LaneExecutor::Local(self.local.clone()),
                self.config.test_prompts.clone(),
                session_token.clone(),
                grace,
                state.clone(),
            )));
        }
        if let (true, Some(cloud)) = (mode.includes_cloud(), self.cloud.as_ref()) {
            lanes.push(tokio::spawn(inference_lane(
                LaneExecutor::Cloud(cloud.clone()),
                self.config.test_prompts.clone(),
                session_token.clone(),
                grace,
                state.clone(),
            )));
        }

        for (i, outcome) in futures::future::join_all(lanes).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                warn!("Lane task {} ended abnormally: {}", i, e);
            }
        }

        let status = if external_token.is_cancelled() {
            SessionStatus::Cancelled
        } else {
            SessionStatus::Completed
        };
        let end_time = Utc::now();

        // Freeze: lanes are joined, the state is final. Summary is computed
        // exactly once, from this frozen data.
        let frozen = state.lock().await.clone();
        let summary = compute_summary(&frozen.samples, &frozen.records, &self.power_model);

        let document = SessionDocument {
            session_id,
            mode,
            start_time,
            end_time,
            status,
            configured_duration_secs: duration.as_secs(),
            sampling_interval_secs: self.config.sampling_interval_secs,
            power_model: self.power_model,
            raw_samples: frozen.samples,
            per_lane_records: frozen.records,
            summary,
        };

        let path =
            persist_session(&document, std::path::Path::new(&self.config.output_dir)).await?;
        info!(
            "Session {} finished: {:?}, {} samples",
            session_id,
            document.status,
            document.raw_samples.len()
        );
        Ok((document, path))
    }
}

/// One sequential inference lane
///
/// Issues the next call only after the previous one finishes. Observes the
/// cancellation signal between calls and mid-call: an in-flight call gets
/// the grace period to finish and is otherwise abandoned and recorded as a
/// failure, so the session never hangs on a stuck executor.
async fn inference_lane(
    executor: LaneExecutor,
    prompts: Vec<String>,
    token: CancellationToken,
    grace: Duration,
    state: Arc<Mutex<SessionState>>,
) {
    let lane = executor.kind();
    let mut index = 0usize;

    loop {
        if token.is_cancelled() {
            break;
        }
        let prompt = prompts[index % prompts.len()].clone();
        index += 1;
        let started_at = Utc::now();

        let call = executor.call(&prompt);
        tokio::pin!(call);
        let outcome = tokio::select! {
            result = &mut call => Some(result),
            _ = token.cancelled() => {
                match tokio::time::timeout(grace, &mut call).await {
                    Ok(result) => Some(result),
                    Err(_) => None,
                }
            }
        };

        let record = match outcome {
            Some(Ok(text)) => InferenceRecord::success(&prompt, &text, started_at, Utc::now()),
            Some(Err((kind, message))) => {
                debug!("{} lane call failed: {}", lane, message);
                InferenceRecord::failure(&prompt, kind, message, started_at, Utc::now())
            }
            None => {
                warn!(
                    "{} lane abandoned an in-flight call after {:?} grace",
                    lane, grace
                );
                InferenceRecord::failure(
                    &prompt,
                    FailureKind::Abandoned,
                    format!("abandoned after {}ms grace period", grace.as_millis()),
                    started_at,
                    Utc::now(),
                )
            }
        };
        state.lock().await.records.entry(lane).or_default().push(record);
    }
    debug!("{} lane stopped after {} calls", lane, index);
}
