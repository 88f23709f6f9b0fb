use super::watchdog::Watchdog;
use crate::calibration::CalibrationCache;
use crate::device::{DepthCamera, DeviceIdentity};
use crate::publisher::PublisherSet;
use crate::registry::{StreamRegistry, UseCaseEntry};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Externally visible connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Disconnected,
    Idle,
    Streaming,
}

/// What a streaming frame is demultiplexed against. Swapped as a whole so a
/// frame never sees a mix of old and new topology.
pub(crate) struct Topology {
    pub entry: Arc<UseCaseEntry>,
    pub calibration: CalibrationCache,
    pub publishers: Arc<PublisherSet>,
}

/// Reconnect bookkeeping, reported through the diagnostic dump
#[derive(Debug, Default)]
pub(crate) struct ReconnectTracker {
    pub attempts: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_attempt: Option<Instant>,
    pub last_error: Option<String>,
    /// A reconnect failed and the watchdog should retry
    pub pending: bool,
    /// Restart streaming once the retry succeeds
    pub resume_streaming: bool,
}

impl ReconnectTracker {
    pub fn begin(&mut self, now: Instant) {
        self.attempts += 1;
        self.last_attempt = Some(now);
    }

    pub fn succeeded(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                "Camera recovered after {} failed reconnect attempts",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.pending = false;
        self.resume_streaming = false;
    }

    pub fn failed(&mut self, error: String, resume_streaming: bool) {
        self.failures += 1;
        self.consecutive_failures += 1;
        warn!(
            "Reconnect attempt {} failed ({} in a row): {}",
            self.attempts, self.consecutive_failures, error
        );
        self.last_error = Some(error);
        self.pending = resume_streaming;
        self.resume_streaming = resume_streaming;
    }

    pub fn clear_pending(&mut self) {
        self.pending = false;
        self.resume_streaming = false;
    }
}

/// Everything guarded by the session lock
pub(crate) struct SessionState {
    pub device: Option<Box<dyn DepthCamera>>,
    pub identity: Option<DeviceIdentity>,
    pub streaming: bool,
    pub active_use_case: Option<Arc<UseCaseEntry>>,
    pub access_level: u32,
    pub registry: StreamRegistry,
    pub calibration: CalibrationCache,
    /// Materialized publishers for the active use case
    pub publishers: Option<Arc<PublisherSet>>,
    pub publisher_generation: u64,
    pub watchdog: Watchdog,
    pub recovery: ReconnectTracker,
    pub shut_down: bool,
}

impl SessionState {
    pub fn new(watchdog: Watchdog) -> Self {
        Self {
            device: None,
            identity: None,
            streaming: false,
            active_use_case: None,
            access_level: 0,
            registry: StreamRegistry::default(),
            calibration: CalibrationCache::new(),
            publishers: None,
            publisher_generation: 0,
            watchdog,
            recovery: ReconnectTracker::default(),
            shut_down: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match (&self.device, self.streaming) {
            (None, _) => SessionStatus::Disconnected,
            (Some(_), false) => SessionStatus::Idle,
            (Some(_), true) => SessionStatus::Streaming,
        }
    }

    pub fn active_use_case_name(&self) -> Option<String> {
        self.active_use_case.as_ref().map(|entry| entry.name.clone())
    }
}
