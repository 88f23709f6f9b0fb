use super::state::{ReconnectTracker, SessionState, SessionStatus};
use super::watchdog::WatchdogStatus;
use super::CameraSession;
use crate::calibration::CalibrationRecord;
use crate::device::{age_ms, DeviceIdentity, ExposureMode, StreamId};
use crate::error::Result;
use crate::registry::{Channel, UseCaseEntry};
use crate::stats::PipelineCounters;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Reconnect failures in a row after which the camera is reported failed
const FAILED_AFTER_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Failed,
    /// Never connected
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct UseCaseSummary {
    pub name: String,
    pub min_access_level: u32,
    pub stream_ids: Vec<StreamId>,
}

/// One stream of the active use case
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub stream_id: StreamId,
    /// 1-based position, as used in topic names
    pub index: usize,
    pub channels: Vec<Channel>,
    pub exposure_limits: Option<(u32, u32)>,
    pub exposure_mode: Option<ExposureMode>,
    pub calibration: Option<CalibrationRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublisherSummary {
    pub generation: u64,
    pub use_case: String,
    pub topics: Vec<String>,
    pub messages_emitted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub attempts: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub retry_pending: bool,
    pub last_attempt_secs_ago: Option<f64>,
}

impl RecoveryStatus {
    fn from_tracker(tracker: &ReconnectTracker, now: Instant) -> Self {
        Self {
            attempts: tracker.attempts,
            failures: tracker.failures,
            consecutive_failures: tracker.consecutive_failures,
            last_error: tracker.last_error.clone(),
            retry_pending: tracker.pending,
            last_attempt_secs_ago: tracker
                .last_attempt
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
        }
    }
}

/// Read-only view of a session at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSnapshot {
    pub session_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub state: SessionStatus,
    pub health: ComponentHealth,
    pub device: Option<DeviceIdentity>,
    pub access_level: u32,
    pub active_use_case: Option<String>,
    pub use_cases: Vec<UseCaseSummary>,
    pub streams: Vec<StreamSummary>,
    pub publishers: Option<PublisherSummary>,
    /// Age of the last published frame by its device timestamp
    pub last_frame_age_ms: Option<u64>,
    pub last_frame_stamp: Option<DateTime<Utc>>,
    pub pipeline: PipelineCounters,
    pub watchdog: WatchdogStatus,
    pub recovery: RecoveryStatus,
}

impl DiagnosticSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl CameraSession {
    /// Diagnostic snapshot. Valid in every state and never mutates the session.
    pub fn dump(&self) -> DiagnosticSnapshot {
        let state = self.inner.state.lock();
        let now = Instant::now();
        let liveness = self.inner.pipeline.liveness();

        let last_frame_age_ms = liveness.frame_stamp.map(age_ms);

        let streams = state
            .active_use_case
            .as_ref()
            .map(|entry| stream_summaries(&state, entry))
            .unwrap_or_default();

        DiagnosticSnapshot {
            session_id: self.inner.session_id,
            captured_at: Utc::now(),
            state: state.status(),
            health: grade_health(&state),
            device: state.identity.clone(),
            access_level: state.access_level,
            active_use_case: state.active_use_case_name(),
            use_cases: state
                .registry
                .entries()
                .map(|entry| UseCaseSummary {
                    name: entry.name.clone(),
                    min_access_level: entry.min_access_level,
                    stream_ids: entry.stream_ids(),
                })
                .collect(),
            streams,
            publishers: state.publishers.as_ref().map(|set| PublisherSummary {
                generation: set.generation(),
                use_case: set.use_case().to_string(),
                topics: set.topics(),
                messages_emitted: set.emitted(),
            }),
            last_frame_age_ms,
            last_frame_stamp: liveness.frame_stamp.map(DateTime::<Utc>::from),
            pipeline: self.inner.pipeline.stats().snapshot(),
            watchdog: state.watchdog.status(),
            recovery: RecoveryStatus::from_tracker(&state.recovery, now),
        }
    }
}

fn stream_summaries(state: &SessionState, entry: &UseCaseEntry) -> Vec<StreamSummary> {
    let device = state.device.as_deref();

    entry
        .streams
        .iter()
        .enumerate()
        .map(|(index, stream)| StreamSummary {
            stream_id: stream.stream_id,
            index: index + 1,
            channels: stream.channels.clone(),
            exposure_limits: device.and_then(|d| d.exposure_limits(stream.stream_id).ok()),
            exposure_mode: device.and_then(|d| d.exposure_mode(stream.stream_id).ok()),
            calibration: state
                .calibration
                .get(stream.stream_id)
                .ok()
                .map(|record| (*record).clone()),
        })
        .collect()
}

fn grade_health(state: &SessionState) -> ComponentHealth {
    let recovery = &state.recovery;
    if recovery.consecutive_failures >= FAILED_AFTER_CONSECUTIVE_FAILURES {
        return ComponentHealth::Failed;
    }
    if recovery.consecutive_failures > 0 || recovery.pending {
        return ComponentHealth::Degraded;
    }
    match state.status() {
        SessionStatus::Disconnected if recovery.attempts == 0 => ComponentHealth::Unknown,
        SessionStatus::Disconnected => ComponentHealth::Degraded,
        SessionStatus::Idle | SessionStatus::Streaming => ComponentHealth::Healthy,
    }
}
