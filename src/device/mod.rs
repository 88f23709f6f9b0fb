mod frame;
mod interface;
mod sim;
#[cfg(test)]
mod tests;

/// Opaque stream identifier issued by the camera
pub type StreamId = u16;

pub use frame::{age_ms, DepthFrame, DepthPoint};
pub use interface::{
    is_wildcard_serial, CameraProvider, DataListener, DepthCamera, DeviceIdentity, ExposureMode,
    LensParameters, UseCaseCapabilities,
};
pub use sim::{
    synthetic_frame, SimulatedCamera, SimulatedCameraSpec, SimulatedCounters, SimulatedProvider,
};
