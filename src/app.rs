//! Process lifecycle: bring a session up from configuration, wait for a
//! termination signal, tear it down.

use crate::config::DepthcamConfig;
use crate::device::CameraProvider;
use crate::error::{DepthcamError, Result};
use crate::publisher::Transport;
use crate::session::{CameraSessionBuilder, SessionHandle};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Why the process is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
}

/// Validate `config`, open the camera and select the initial use case.
/// Streaming is not started.
pub fn initialize(
    config: &DepthcamConfig,
    provider: Arc<dyn CameraProvider>,
    transport: Arc<dyn Transport>,
) -> Result<SessionHandle> {
    config.validate()?;

    let session = CameraSessionBuilder::new()
        .config(config)
        .provider(provider)
        .transport(transport)
        .build()?;

    session.connect().map_err(|e| {
        error!("Failed to connect camera: {}", e);
        e
    })?;

    info!(
        "Camera session {} initialized (use case {})",
        session.session_id(),
        session.active_use_case().unwrap_or_default()
    );
    Ok(session)
}

pub fn shutdown(handle: SessionHandle) {
    info!("Shutting down camera session {}", handle.session_id());
    handle.shutdown();
}

/// Wait for SIGINT or SIGTERM
pub async fn wait_for_signal() -> Result<ShutdownReason> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| {
                DepthcamError::system(format!("Failed to register SIGTERM handler: {e}"))
            })?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                Ok(ShutdownReason::Signal("SIGTERM".to_string()))
            }
            result = signal::ctrl_c() => {
                result.map_err(|e| {
                    DepthcamError::system(format!("Failed to listen for Ctrl+C: {e}"))
                })?;
                info!("Received SIGINT signal (Ctrl+C)");
                Ok(ShutdownReason::Signal("SIGINT".to_string()))
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .map_err(|e| {
                DepthcamError::system(format!("Failed to listen for Ctrl+C: {e}"))
            })?;
        info!("Received SIGINT signal (Ctrl+C)");
        Ok(ShutdownReason::Signal("SIGINT".to_string()))
    }
}

/// Run until a termination signal arrives, then shut the session down.
/// Returns the process exit code.
pub async fn run_until_signal(handle: SessionHandle) -> i32 {
    info!("Depthcam is running");

    let (reason, exit_code) = match wait_for_signal().await {
        Ok(reason) => (reason, 0),
        Err(e) => {
            error!("Signal handling failed: {}", e);
            (ShutdownReason::Error(e.to_string()), 1)
        }
    };

    info!("Shutdown initiated: {:?}", reason);
    shutdown(handle);
    info!("Depthcam shutdown complete");
    exit_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedCamera, SimulatedCameraSpec, SimulatedProvider};
    use crate::publisher::BroadcastTransport;
    use crate::session::SessionStatus;

    fn create_test_provider() -> (SimulatedCamera, Arc<dyn CameraProvider>) {
        let camera = SimulatedCamera::new(SimulatedCameraSpec {
            width: 4,
            height: 3,
            ..Default::default()
        });
        let provider: Arc<dyn CameraProvider> =
            Arc::new(SimulatedProvider::with_camera(camera.clone()));
        (camera, provider)
    }

    #[test]
    fn test_initialize_and_shutdown() {
        let (camera, provider) = create_test_provider();
        let mut config = DepthcamConfig::default();
        config.camera.initial_use_case = "MODE_5_45FPS_500".to_string();

        let handle =
            initialize(&config, provider, Arc::new(BroadcastTransport::default())).unwrap();
        assert_eq!(handle.status(), SessionStatus::Idle);
        assert_eq!(camera.active_use_case(), "MODE_5_45FPS_500");

        handle.start().unwrap();
        let observer = handle.clone();
        shutdown(handle);

        assert_eq!(observer.status(), SessionStatus::Disconnected);
        assert!(!camera.has_listener());
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let (_, provider) = create_test_provider();
        let mut config = DepthcamConfig::default();
        config.watchdog.timeout_secs = 0.0;

        assert!(matches!(
            initialize(&config, provider.clone(), Arc::new(BroadcastTransport::default())),
            Err(DepthcamError::Config(_))
        ));

        config.watchdog.timeout_secs = f64::INFINITY;
        assert!(matches!(
            initialize(&config, provider, Arc::new(BroadcastTransport::default())),
            Err(DepthcamError::Config(_))
        ));
    }

    #[test]
    fn test_initialize_reports_missing_camera() {
        let (_, provider) = create_test_provider();
        let mut config = DepthcamConfig::default();
        config.camera.serial_number = "0000-0000-0000-0000".to_string();

        assert!(matches!(
            initialize(&config, provider, Arc::new(BroadcastTransport::default())),
            Err(DepthcamError::DeviceOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_receive_frames() {
        let (camera, provider) = create_test_provider();
        let transport = Arc::new(BroadcastTransport::default());
        let mut receiver = transport.subscribe("stream/1/cloud");

        let handle =
            initialize(&DepthcamConfig::default(), provider, transport.clone()).unwrap();
        handle.start().unwrap();
        assert!(camera.deliver(&camera.synthetic_frame(0xdefa)));

        let message = receiver.recv().await.unwrap();
        assert_eq!(message.header().frame_id, "camera_link");
        assert!(message.calibration().is_some());

        shutdown(handle);
    }
}
