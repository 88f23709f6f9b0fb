use crate::calibration::CalibrationRecord;
use crate::device::{DepthFrame, DepthPoint, StreamId};
use crate::registry::Channel;
use std::sync::Arc;
use std::time::SystemTime;

/// Common message header
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Per-stream frame sequence number
    pub seq: u64,
    /// Device capture time
    pub stamp: SystemTime,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub noise: f32,
    pub intensity: u16,
    pub confidence: u8,
}

#[derive(Debug, Clone)]
pub struct PointCloud {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    /// False when any point is invalid (NaN coordinates)
    pub is_dense: bool,
    pub points: Vec<CloudPoint>,
    pub calibration: Arc<CalibrationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Mono8,
    Mono16,
    Float32C1,
    Float32C3,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Mono8 => "mono8",
            ImageEncoding::Mono16 => "mono16",
            ImageEncoding::Float32C1 => "32FC1",
            ImageEncoding::Float32C3 => "32FC3",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    Mono8(Vec<u8>),
    Mono16(Vec<u16>),
    Float32(Vec<f32>),
}

impl ImageData {
    /// Number of samples, not pixels
    pub fn len(&self) -> usize {
        match self {
            ImageData::Mono8(v) => v.len(),
            ImageData::Mono16(v) => v.len(),
            ImageData::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub data: ImageData,
    pub calibration: Arc<CalibrationRecord>,
}

#[derive(Debug, Clone)]
pub struct ExposureTimes {
    pub header: Header,
    pub stream_id: StreamId,
    pub usecs: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub header: Header,
    pub record: Arc<CalibrationRecord>,
}

/// Anything the publisher set can emit
#[derive(Debug, Clone)]
pub enum DataMessage {
    Cloud(PointCloud),
    Image(Image),
    Exposure(ExposureTimes),
    CameraInfo(CameraInfo),
}

impl DataMessage {
    pub fn header(&self) -> &Header {
        match self {
            DataMessage::Cloud(m) => &m.header,
            DataMessage::Image(m) => &m.header,
            DataMessage::Exposure(m) => &m.header,
            DataMessage::CameraInfo(m) => &m.header,
        }
    }

    /// Calibration attached to the message, if it is spatial or camera info
    pub fn calibration(&self) -> Option<&Arc<CalibrationRecord>> {
        match self {
            DataMessage::Cloud(m) => Some(&m.calibration),
            DataMessage::Image(m) => Some(&m.calibration),
            DataMessage::CameraInfo(m) => Some(&m.record),
            DataMessage::Exposure(_) => None,
        }
    }
}

/// Everything needed to turn one frame into outbound messages
pub struct FrameContext<'a> {
    pub frame: &'a DepthFrame,
    pub seq: u64,
    pub optical_frame: &'a str,
    pub sensor_frame: &'a str,
    pub calibration: &'a Arc<CalibrationRecord>,
}

impl FrameContext<'_> {
    fn header(&self, frame_id: &str) -> Header {
        Header {
            seq: self.seq,
            stamp: self.frame.timestamp,
            frame_id: frame_id.to_string(),
        }
    }

    fn image(&self, encoding: ImageEncoding, data: ImageData) -> DataMessage {
        let frame_id = match encoding {
            ImageEncoding::Float32C3 => self.sensor_frame,
            _ => self.optical_frame,
        };
        DataMessage::Image(Image {
            header: self.header(frame_id),
            width: self.frame.width as u32,
            height: self.frame.height as u32,
            encoding,
            data,
            calibration: Arc::clone(self.calibration),
        })
    }

    fn points(&self) -> impl Iterator<Item = &DepthPoint> {
        self.frame.points.iter()
    }

    /// Build the message for `channel`
    pub fn build(&self, channel: Channel) -> DataMessage {
        match channel {
            Channel::Cloud => {
                let points: Vec<CloudPoint> = self
                    .points()
                    .map(|p| {
                        let (x, y, z) = spatial(p);
                        CloudPoint {
                            x,
                            y,
                            z,
                            noise: p.noise,
                            intensity: p.gray_value,
                            confidence: p.depth_confidence,
                        }
                    })
                    .collect();
                DataMessage::Cloud(PointCloud {
                    header: self.header(self.sensor_frame),
                    width: self.frame.width as u32,
                    height: self.frame.height as u32,
                    is_dense: self.points().all(DepthPoint::is_valid),
                    points,
                    calibration: Arc::clone(self.calibration),
                })
            }
            Channel::Gray => self.image(
                ImageEncoding::Mono16,
                ImageData::Mono16(self.points().map(|p| p.gray_value).collect()),
            ),
            Channel::Confidence => self.image(
                ImageEncoding::Mono8,
                ImageData::Mono8(self.points().map(|p| p.depth_confidence).collect()),
            ),
            Channel::Noise => self.image(
                ImageEncoding::Float32C1,
                ImageData::Float32(self.points().map(|p| p.noise).collect()),
            ),
            Channel::Xyz => {
                let mut xyz = Vec::with_capacity(self.frame.points.len() * 3);
                for p in self.points() {
                    let (x, y, z) = spatial(p);
                    xyz.extend_from_slice(&[x, y, z]);
                }
                self.image(ImageEncoding::Float32C3, ImageData::Float32(xyz))
            }
            Channel::Exposure => DataMessage::Exposure(ExposureTimes {
                header: self.header(self.sensor_frame),
                stream_id: self.frame.stream_id,
                usecs: self.frame.exposure_times.clone(),
            }),
            Channel::CameraInfo => DataMessage::CameraInfo(CameraInfo {
                header: self.header(self.optical_frame),
                record: Arc::clone(self.calibration),
            }),
        }
    }
}

fn spatial(point: &DepthPoint) -> (f32, f32, f32) {
    if point.is_valid() {
        (point.x, point.y, point.z)
    } else {
        (f32::NAN, f32::NAN, f32::NAN)
    }
}
