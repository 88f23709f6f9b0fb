use super::StreamId;
use std::time::SystemTime;

/// A single measured point as delivered by the camera
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthPoint {
    /// Cartesian coordinates in meters, sensor frame
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Noise standard deviation in meters
    pub noise: f32,
    /// 16-bit amplitude/intensity
    pub gray_value: u16,
    /// 0 = invalid, 255 = full confidence
    pub depth_confidence: u8,
}

impl DepthPoint {
    pub fn is_valid(&self) -> bool {
        self.depth_confidence > 0
    }
}

/// One depth frame for one stream, valid only for the duration of the data callback
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Stream this frame belongs to
    pub stream_id: StreamId,
    /// Capture time reported by the device
    pub timestamp: SystemTime,
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Exposure times in microseconds, one per exposure group
    pub exposure_times: Vec<u32>,
    /// Row-major points, `width * height` entries
    pub points: Vec<DepthPoint>,
}

impl DepthFrame {
    /// Expected number of points for the frame geometry
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Validate point count against the declared geometry
    pub fn validate_size(&self) -> bool {
        self.expected_len() > 0 && self.points.len() == self.expected_len()
    }
}

/// Milliseconds elapsed since `stamp`, zero for stamps in the future
pub fn age_ms(stamp: SystemTime) -> u64 {
    SystemTime::now()
        .duration_since(stamp)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(width: u16, height: u16, points: usize) -> DepthFrame {
        DepthFrame {
            stream_id: 1,
            timestamp: SystemTime::now() - Duration::from_millis(50),
            width,
            height,
            exposure_times: vec![200],
            points: vec![DepthPoint::default(); points],
        }
    }

    #[test]
    fn test_validate_size() {
        assert!(frame(4, 3, 12).validate_size());
        assert!(!frame(4, 3, 11).validate_size());
        assert!(!frame(0, 0, 0).validate_size());
    }

    #[test]
    fn test_frame_age() {
        assert!(age_ms(frame(1, 1, 1).timestamp) >= 50);
        assert_eq!(age_ms(SystemTime::now() + Duration::from_secs(5)), 0);
    }

    #[test]
    fn test_point_validity() {
        let mut point = DepthPoint::default();
        assert!(!point.is_valid());
        point.depth_confidence = 1;
        assert!(point.is_valid());
    }
}
