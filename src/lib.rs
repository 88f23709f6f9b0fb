pub mod app;
pub mod calibration;
pub mod config;
pub mod device;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod session;
pub mod stats;

pub use app::{initialize, run_until_signal, shutdown, ShutdownReason};
pub use calibration::{CalibrationCache, CalibrationRecord};
pub use config::DepthcamConfig;
pub use device::{
    CameraProvider, DataListener, DepthCamera, DepthFrame, DepthPoint, ExposureMode,
    SimulatedCamera, SimulatedCameraSpec, SimulatedProvider, StreamId,
};
pub use error::{DepthcamError, DeviceError, FrameError, Result};
pub use publisher::{BroadcastTransport, DataMessage, Endpoint, PublisherSet, Transport};
pub use registry::{Channel, StreamDescriptor, StreamRegistry, UseCaseEntry};
pub use session::{
    CameraSession, CameraSessionBuilder, ComponentHealth, DiagnosticSnapshot, ImagerConfig,
    SessionHandle, SessionSettings, SessionStatus, WatchdogVerdict,
};
pub use stats::{PipelineCounters, PipelineStats};
