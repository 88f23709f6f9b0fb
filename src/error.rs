use crate::device::StreamId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepthcamError {
    #[error("Failed to open camera '{serial}': {details}")]
    DeviceOpen { serial: String, details: String },

    #[error("Access level {granted} is insufficient for use case '{use_case}' (requires {required})")]
    AccessDenied {
        use_case: String,
        required: u32,
        granted: u32,
    },

    #[error("Unknown use case: {name}")]
    UnknownUseCase { name: String },

    #[error("Camera is already streaming")]
    AlreadyStreaming,

    #[error("Camera is not streaming")]
    NotStreaming,

    #[error("Camera is not connected")]
    NotConnected,

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System error: {message}")]
    System { message: String },
}

impl DepthcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn unknown_use_case<S: Into<String>>(name: S) -> Self {
        Self::UnknownUseCase { name: name.into() }
    }
}

/// Failures reported by the camera driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("No camera found matching serial '{serial}'")]
    NotFound { serial: String },

    #[error("Camera {operation} failed: {details}")]
    Sdk {
        operation: &'static str,
        details: String,
    },

    #[error("Stream {stream_id} is not part of the current use case")]
    InvalidStream { stream_id: StreamId },

    #[error("Exposure {value}us out of range [{min}, {max}] for stream {stream_id}")]
    ExposureOutOfRange {
        stream_id: StreamId,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Camera is disconnected")]
    Disconnected,
}

impl DeviceError {
    pub fn sdk<S: Into<String>>(operation: &'static str, details: S) -> Self {
        Self::Sdk {
            operation,
            details: details.into(),
        }
    }
}

/// Per-frame anomalies. These are counted and logged by the pipeline, never returned to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Frame carries stream id {0} which the active use case does not declare")]
    UnknownStreamId(StreamId),

    #[error("Malformed frame for stream {stream_id}: {details}")]
    MalformedPayload { stream_id: StreamId, details: String },

    #[error("No calibration cached for stream {0}")]
    StaleCalibration(StreamId),
}

pub type Result<T> = std::result::Result<T, DepthcamError>;
