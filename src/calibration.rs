use crate::device::{DepthCamera, LensParameters, StreamId};
use crate::error::{DeviceError, FrameError};
use crate::registry::UseCaseEntry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Intrinsics for one stream in the layout of a pinhole camera-info record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRecord {
    pub stream_id: StreamId,
    /// Frame of reference the intrinsics are expressed in
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub distortion_model: &'static str,
    /// k1, k2, p1, p2, k3
    pub d: [f64; 5],
    /// Row-major 3x3 intrinsic matrix
    pub k: [f64; 9],
    /// Row-major 3x3 rectification matrix
    pub r: [f64; 9],
    /// Row-major 3x4 projection matrix
    pub p: [f64; 12],
}

impl CalibrationRecord {
    pub fn from_lens(stream_id: StreamId, frame_id: &str, lens: &LensParameters) -> Self {
        let (cx, cy) = (lens.principal_point.0 as f64, lens.principal_point.1 as f64);
        let (fx, fy) = (lens.focal_length.0 as f64, lens.focal_length.1 as f64);
        let radial = |i: usize| lens.distortion_radial.get(i).copied().unwrap_or(0.0) as f64;

        Self {
            stream_id,
            frame_id: frame_id.to_string(),
            width: lens.width as u32,
            height: lens.height as u32,
            distortion_model: "plumb_bob",
            d: [
                radial(0),
                radial(1),
                lens.distortion_tangential.0 as f64,
                lens.distortion_tangential.1 as f64,
                radial(2),
            ],
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }
}

/// Calibration records for the streams of one use case.
///
/// Cheap to clone; the streaming topology holds a clone so frames read it
/// without the session lock.
#[derive(Debug, Clone, Default)]
pub struct CalibrationCache {
    use_case: Option<String>,
    records: Arc<HashMap<StreamId, Arc<CalibrationRecord>>>,
    fetches: u64,
}

impl CalibrationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one record per stream of `entry` from the camera, replacing
    /// whatever was cached. Nothing changes on failure.
    pub fn refresh(
        &mut self,
        device: &dyn DepthCamera,
        entry: &UseCaseEntry,
        frame_id: &str,
    ) -> Result<(), DeviceError> {
        let mut records = HashMap::with_capacity(entry.streams.len());
        for stream in &entry.streams {
            let lens = device.lens_parameters(stream.stream_id)?;
            records.insert(
                stream.stream_id,
                Arc::new(CalibrationRecord::from_lens(stream.stream_id, frame_id, &lens)),
            );
        }

        info!(
            "Cached calibration for {} streams of use case {}",
            records.len(),
            entry.name
        );
        self.records = Arc::new(records);
        self.use_case = Some(entry.name.clone());
        self.fetches += 1;
        Ok(())
    }

    /// Refresh only when the cache does not already hold `entry`
    pub fn ensure(
        &mut self,
        device: &dyn DepthCamera,
        entry: &UseCaseEntry,
        frame_id: &str,
    ) -> Result<(), DeviceError> {
        if self.is_valid_for(&entry.name) {
            debug!("Calibration cache hit for use case {}", entry.name);
            return Ok(());
        }
        self.refresh(device, entry, frame_id)
    }

    pub fn invalidate(&mut self) {
        if self.use_case.take().is_some() {
            debug!("Calibration cache invalidated");
        }
        self.records = Arc::new(HashMap::new());
    }

    pub fn get(&self, stream_id: StreamId) -> Result<Arc<CalibrationRecord>, FrameError> {
        self.records
            .get(&stream_id)
            .cloned()
            .ok_or(FrameError::StaleCalibration(stream_id))
    }

    pub fn is_valid_for(&self, use_case: &str) -> bool {
        self.use_case.as_deref() == Some(use_case)
    }

    pub fn use_case(&self) -> Option<&str> {
        self.use_case.as_deref()
    }

    /// Number of refreshes that went to the camera
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    pub fn records(&self) -> Vec<Arc<CalibrationRecord>> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.stream_id);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedCamera, SimulatedCameraSpec};
    use crate::registry::StreamRegistry;
    use std::sync::atomic::Ordering;

    fn lens() -> LensParameters {
        LensParameters {
            principal_point: (112.0, 85.5),
            focal_length: (210.0, 211.0),
            distortion_tangential: (0.01, 0.02),
            distortion_radial: vec![0.1, 0.2, 0.3],
            width: 224,
            height: 171,
        }
    }

    #[test]
    fn test_record_from_lens() {
        let record = CalibrationRecord::from_lens(3, "camera_optical_link", &lens());

        assert_eq!(record.frame_id, "camera_optical_link");
        assert_eq!((record.width, record.height), (224, 171));
        assert_eq!(record.k[0], 210.0);
        assert_eq!(record.k[2], 112.0);
        assert_eq!(record.k[4], 211.0);
        assert_eq!(record.k[5], 85.5);
        assert!((record.d[2] - 0.01).abs() < 1e-6);
        assert!((record.d[4] - 0.3).abs() < 1e-6);
        assert_eq!(record.p[10], 1.0);
    }

    #[test]
    fn test_record_with_short_radial_distortion() {
        let mut lens = lens();
        lens.distortion_radial = vec![0.5];
        let record = CalibrationRecord::from_lens(1, "f", &lens);
        assert_eq!(record.d[1], 0.0);
        assert_eq!(record.d[4], 0.0);
    }

    #[test]
    fn test_cache_refresh_and_hit() {
        let camera = SimulatedCamera::new(SimulatedCameraSpec::default());
        let registry = StreamRegistry::from_device(&camera).unwrap();
        let mixed = registry.resolve("MODE_MIXED_30_5").unwrap();
        let mut device = camera.clone();
        crate::device::DepthCamera::set_use_case(&mut device, "MODE_MIXED_30_5").unwrap();

        let mut cache = CalibrationCache::new();
        assert!(matches!(
            cache.get(0xdefa),
            Err(FrameError::StaleCalibration(0xdefa))
        ));

        cache.ensure(&device, &mixed, "optical").unwrap();
        cache.ensure(&device, &mixed, "optical").unwrap();
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(camera.counters().lens_fetches.load(Ordering::Relaxed), 2);
        assert_eq!(cache.records().len(), 2);
        assert_eq!(cache.get(0xdefb).unwrap().frame_id, "optical");

        cache.invalidate();
        assert!(!cache.is_valid_for("MODE_MIXED_30_5"));
        assert!(cache.get(0xdefa).is_err());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_records() {
        let camera = SimulatedCamera::new(SimulatedCameraSpec::default());
        let registry = StreamRegistry::from_device(&camera).unwrap();
        let entry = registry.resolve("MODE_9_5FPS_2000").unwrap();

        let mut cache = CalibrationCache::new();
        cache.refresh(&camera, &entry, "optical").unwrap();

        camera.set_connected(false);
        assert!(cache.refresh(&camera, &entry, "optical").is_err());
        assert!(cache.is_valid_for("MODE_9_5FPS_2000"));
        assert!(cache.get(0xdefa).is_ok());
    }
}
