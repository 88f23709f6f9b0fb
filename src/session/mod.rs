//! Camera session: the control-plane state machine, the frame pipeline it
//! feeds, and the watchdog that keeps it alive.

mod builder;
mod control;
mod dump;
mod imager;
mod pipeline;
mod state;
mod watchdog;


pub use builder::CameraSessionBuilder;
pub use dump::{
    ComponentHealth, DiagnosticSnapshot, PublisherSummary, RecoveryStatus, StreamSummary,
    UseCaseSummary,
};
pub use imager::{ImagerConfig, ImagerSettings};
pub use pipeline::{FramePipeline, LivenessMark};
pub use state::SessionStatus;
pub use watchdog::{liveness_expired, WatchdogStatus, WatchdogVerdict};

use crate::config::DepthcamConfig;
use crate::device::CameraProvider;
use crate::publisher::Transport;
use parking_lot::Mutex;
use state::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;
use watchdog::Watchdog;

/// Startup parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub access_code: String,
    pub serial_number: String,
    /// Empty keeps whatever use case the camera reports after opening
    pub initial_use_case: String,
    pub optical_frame: String,
    pub sensor_frame: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl From<&DepthcamConfig> for SessionSettings {
    fn from(config: &DepthcamConfig) -> Self {
        Self {
            access_code: config.camera.access_code.clone(),
            serial_number: config.camera.serial_number.clone(),
            initial_use_case: config.camera.initial_use_case.clone(),
            optical_frame: config.camera.optical_frame.clone(),
            sensor_frame: config.camera.sensor_frame.clone(),
            poll_interval: config.watchdog.poll_interval(),
            timeout: config.watchdog.timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&DepthcamConfig::default())
    }
}

pub(crate) struct SessionShared {
    settings: SessionSettings,
    provider: Arc<dyn CameraProvider>,
    transport: Arc<dyn Transport>,
    /// Session lock. Always taken before the pipeline's frame lock.
    state: Mutex<SessionState>,
    pipeline: Arc<FramePipeline>,
    session_id: Uuid,
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.watchdog.disarm();

        if let Some(mut device) = state.device.take() {
            debug!("Releasing camera on session drop");
            if state.streaming {
                if let Err(e) = device.stop_capture() {
                    warn!("Failed to stop capture on drop: {}", e);
                }
                if let Err(e) = device.unregister_data_listener() {
                    warn!("Failed to unregister listener on drop: {}", e);
                }
            }
        }
        self.pipeline.swap_topology(None);
    }
}

/// Handle to one camera session. Clones share the same session.
#[derive(Clone)]
pub struct CameraSession {
    inner: Arc<SessionShared>,
}

/// Handle returned by [`crate::app::initialize`]
pub type SessionHandle = CameraSession;

impl CameraSession {
    /// Create a disconnected session. The watchdog runs on the current tokio
    /// runtime if there is one.
    pub fn new(
        settings: SessionSettings,
        provider: Arc<dyn CameraProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let watchdog = Watchdog::new(
            settings.poll_interval,
            settings.timeout,
            Handle::try_current().ok(),
        );
        let pipeline = Arc::new(FramePipeline::new(
            settings.optical_frame.clone(),
            settings.sensor_frame.clone(),
        ));

        Self {
            inner: Arc::new(SessionShared {
                settings,
                provider,
                transport,
                state: Mutex::new(SessionState::new(watchdog)),
                pipeline,
                session_id: Uuid::new_v4(),
            }),
        }
    }

    pub(crate) fn from_shared(inner: Arc<SessionShared>) -> Self {
        Self { inner }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn pipeline(&self) -> &Arc<FramePipeline> {
        &self.inner.pipeline
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status()
    }

    pub fn is_streaming(&self) -> bool {
        self.status() == SessionStatus::Streaming
    }

    pub fn active_use_case(&self) -> Option<String> {
        self.inner.state.lock().active_use_case_name()
    }

    pub fn use_cases(&self) -> Vec<String> {
        self.inner.state.lock().registry.use_case_names()
    }

    pub fn watchdog_armed(&self) -> bool {
        self.inner.state.lock().watchdog.is_armed()
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("session_id", &self.inner.session_id)
            .field("serial_number", &self.inner.settings.serial_number)
            .finish()
    }
}
