use super::frame::DepthFrame;
use super::StreamId;
use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback invoked by the camera on its own delivery thread for every new frame
pub type DataListener = Arc<dyn Fn(&DepthFrame) + Send + Sync>;

/// Identity of an opened camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
    pub serial: String,
}

/// Capability report for one use case
#[derive(Debug, Clone, PartialEq)]
pub struct UseCaseCapabilities {
    pub name: String,
    /// Stream ids in device order
    pub stream_ids: Vec<StreamId>,
    /// Minimum access level required to activate the use case
    pub min_access_level: u32,
    /// False for raw/gray-only modes that deliver no depth data
    pub has_depth: bool,
}

/// Pinhole lens model as reported by the camera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LensParameters {
    /// (cx, cy) in pixels
    pub principal_point: (f32, f32),
    /// (fx, fy) in pixels
    pub focal_length: (f32, f32),
    /// (p1, p2)
    pub distortion_tangential: (f32, f32),
    /// k1, k2, k3
    pub distortion_radial: Vec<f32>,
    /// Sensor width and height in pixels
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExposureMode {
    Manual,
    Automatic,
}

/// Driver-side handle for one physical depth camera.
///
/// All calls are blocking and bounded by the driver's own timeouts. The data
/// listener is invoked on a thread owned by the driver.
pub trait DepthCamera: Send {
    fn identity(&self) -> DeviceIdentity;

    /// Access level granted by the access code the camera was opened with
    fn access_level(&self) -> u32;

    fn use_cases(&self) -> Result<Vec<String>, DeviceError>;

    fn use_case_capabilities(&self, name: &str) -> Result<UseCaseCapabilities, DeviceError>;

    fn current_use_case(&self) -> Result<String, DeviceError>;

    fn set_use_case(&mut self, name: &str) -> Result<(), DeviceError>;

    fn register_data_listener(&mut self, listener: DataListener) -> Result<(), DeviceError>;

    fn unregister_data_listener(&mut self) -> Result<(), DeviceError>;

    fn start_capture(&mut self) -> Result<(), DeviceError>;

    /// Stop frame delivery. Frames still queued inside the driver are discarded
    /// and no listener invocation is in flight once this returns.
    fn stop_capture(&mut self) -> Result<(), DeviceError>;

    fn is_capturing(&self) -> bool;

    fn lens_parameters(&self, stream_id: StreamId) -> Result<LensParameters, DeviceError>;

    /// Inclusive (min, max) exposure time in microseconds
    fn exposure_limits(&self, stream_id: StreamId) -> Result<(u32, u32), DeviceError>;

    fn set_exposure_time(&mut self, stream_id: StreamId, usecs: u32) -> Result<(), DeviceError>;

    fn exposure_mode(&self, stream_id: StreamId) -> Result<ExposureMode, DeviceError>;

    fn set_exposure_mode(
        &mut self,
        stream_id: StreamId,
        mode: ExposureMode,
    ) -> Result<(), DeviceError>;
}

/// Enumerates and opens cameras
pub trait CameraProvider: Send + Sync {
    /// Open the camera with `serial`, or the first connected camera when the
    /// serial is empty or `-`.
    fn open(&self, serial: &str, access_code: &str) -> Result<Box<dyn DepthCamera>, DeviceError>;
}

/// True when `serial` means "first available camera"
pub fn is_wildcard_serial(serial: &str) -> bool {
    serial.is_empty() || serial == "-"
}
