mod messages;
#[cfg(test)]
mod recording;
mod set;
mod transport;
#[cfg(test)]
mod tests;

pub use messages::{
    CameraInfo, CloudPoint, DataMessage, ExposureTimes, FrameContext, Header, Image, ImageData,
    ImageEncoding, PointCloud,
};
#[cfg(test)]
pub(crate) use recording::{Recorded, RecordingTransport};
pub use set::PublisherSet;
pub use transport::{BroadcastTransport, Endpoint, Transport};
