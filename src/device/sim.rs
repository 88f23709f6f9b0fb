use super::frame::{DepthFrame, DepthPoint};
use super::interface::{
    is_wildcard_serial, CameraProvider, DataListener, DepthCamera, DeviceIdentity, ExposureMode,
    LensParameters, UseCaseCapabilities,
};
use super::StreamId;
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// Static description of a simulated camera
#[derive(Debug, Clone)]
pub struct SimulatedCameraSpec {
    pub serial: String,
    pub name: String,
    pub use_cases: Vec<UseCaseCapabilities>,
    /// Use case active right after open
    pub default_use_case: String,
    /// Access code -> granted level. Unknown codes get level 1.
    pub access_codes: Vec<(String, u32)>,
    pub width: u16,
    pub height: u16,
    /// Generate frames on a driver thread at this rate. `None` means frames are
    /// only delivered through [`SimulatedCamera::deliver`].
    pub fps: Option<u32>,
    pub exposure_limits: (u32, u32),
}

impl Default for SimulatedCameraSpec {
    fn default() -> Self {
        Self {
            serial: "0005-4804-0050-1622".to_string(),
            name: "PICOFLEXX (simulated)".to_string(),
            use_cases: vec![
                UseCaseCapabilities {
                    name: "MODE_9_5FPS_2000".to_string(),
                    stream_ids: vec![0xdefa],
                    min_access_level: 1,
                    has_depth: true,
                },
                UseCaseCapabilities {
                    name: "MODE_5_45FPS_500".to_string(),
                    stream_ids: vec![0xdefa],
                    min_access_level: 1,
                    has_depth: true,
                },
                UseCaseCapabilities {
                    name: "MODE_MIXED_30_5".to_string(),
                    stream_ids: vec![0xdefa, 0xdefb],
                    min_access_level: 1,
                    has_depth: true,
                },
                UseCaseCapabilities {
                    name: "MODE_RAW_GRAY".to_string(),
                    stream_ids: vec![0xdefc],
                    min_access_level: 2,
                    has_depth: false,
                },
            ],
            default_use_case: "MODE_9_5FPS_2000".to_string(),
            access_codes: Vec::new(),
            width: 224,
            height: 171,
            fps: None,
            exposure_limits: (100, 2000),
        }
    }
}

/// Observable call counters
#[derive(Debug, Default)]
pub struct SimulatedCounters {
    pub opens: AtomicU64,
    pub listener_registrations: AtomicU64,
    pub lens_fetches: AtomicU64,
    pub exposure_writes: AtomicU64,
    pub frames_delivered: AtomicU64,
}

struct SimState {
    use_case: String,
    access_level: u32,
    listener: Option<DataListener>,
    capturing: bool,
    exposure: HashMap<StreamId, u32>,
    modes: HashMap<StreamId, ExposureMode>,
    generator: Option<JoinHandle<()>>,
}

struct SimShared {
    spec: SimulatedCameraSpec,
    state: Mutex<SimState>,
    generating: AtomicBool,
    connected: AtomicBool,
    pending_open_failures: AtomicU32,
    reject_exposure: AtomicBool,
    counters: SimulatedCounters,
    sequence: AtomicU64,
}

/// In-process camera that behaves like the real driver: frames arrive on a
/// separate thread, use cases gate on access level, exposure is range checked.
///
/// Clones share the same device, so a test can keep one clone to inject frames
/// and observe counters while the session owns another.
#[derive(Clone)]
pub struct SimulatedCamera {
    shared: Arc<SimShared>,
}

impl SimulatedCamera {
    pub fn new(spec: SimulatedCameraSpec) -> Self {
        let state = SimState {
            use_case: spec.default_use_case.clone(),
            access_level: 1,
            listener: None,
            capturing: false,
            exposure: HashMap::new(),
            modes: HashMap::new(),
            generator: None,
        };

        Self {
            shared: Arc::new(SimShared {
                spec,
                state: Mutex::new(state),
                generating: AtomicBool::new(false),
                connected: AtomicBool::new(true),
                pending_open_failures: AtomicU32::new(0),
                reject_exposure: AtomicBool::new(false),
                counters: SimulatedCounters::default(),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn spec(&self) -> &SimulatedCameraSpec {
        &self.shared.spec
    }

    pub fn counters(&self) -> &SimulatedCounters {
        &self.shared.counters
    }

    /// Simulate unplugging or replugging the camera
    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next `count` open attempts fail
    pub fn fail_next_opens(&self, count: u32) {
        self.shared
            .pending_open_failures
            .store(count, Ordering::SeqCst);
    }

    /// Make the driver reject every exposure write
    pub fn reject_exposure_writes(&self, reject: bool) {
        self.shared.reject_exposure.store(reject, Ordering::SeqCst);
    }

    pub fn has_listener(&self) -> bool {
        self.shared.state.lock().listener.is_some()
    }

    pub fn active_use_case(&self) -> String {
        self.shared.state.lock().use_case.clone()
    }

    pub fn exposure_time(&self, stream_id: StreamId) -> Option<u32> {
        self.shared.state.lock().exposure.get(&stream_id).copied()
    }

    /// Deliver a frame through the registered listener on the calling thread.
    /// Returns false when the camera is not capturing or has no listener.
    pub fn deliver(&self, frame: &DepthFrame) -> bool {
        let listener = {
            let state = self.shared.state.lock();
            if !state.capturing {
                return false;
            }
            match &state.listener {
                Some(listener) => Arc::clone(listener),
                None => return false,
            }
        };

        listener(frame);
        self.shared
            .counters
            .frames_delivered
            .fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Build a synthetic frame for `stream_id` at the camera's resolution
    pub fn synthetic_frame(&self, stream_id: StreamId) -> DepthFrame {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        let exposure = self
            .exposure_time(stream_id)
            .unwrap_or(self.shared.spec.exposure_limits.1);
        synthetic_frame(
            stream_id,
            self.shared.spec.width,
            self.shared.spec.height,
            sequence,
            exposure,
        )
    }

    fn capabilities(&self, name: &str) -> Option<&UseCaseCapabilities> {
        self.shared.spec.use_cases.iter().find(|uc| uc.name == name)
    }

    fn check_stream(&self, stream_id: StreamId) -> Result<(), DeviceError> {
        let state = self.shared.state.lock();
        let known = self
            .capabilities(&state.use_case)
            .map(|uc| uc.stream_ids.contains(&stream_id))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(DeviceError::InvalidStream { stream_id })
        }
    }

    fn check_connected(&self) -> Result<(), DeviceError> {
        if self.shared.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::Disconnected)
        }
    }

    fn reset_for_open(&self, access_code: &str) {
        let level = self
            .shared
            .spec
            .access_codes
            .iter()
            .find(|(code, _)| code == access_code)
            .map(|(_, level)| *level)
            .unwrap_or(1);

        let mut state = self.shared.state.lock();
        state.use_case = self.shared.spec.default_use_case.clone();
        state.access_level = level;
        state.listener = None;
        state.capturing = false;
    }

    fn spawn_generator(&self, fps: u32) -> JoinHandle<()> {
        let camera = self.clone();
        let frame_interval = Duration::from_millis(1000 / fps.max(1) as u64);

        std::thread::spawn(move || {
            info!("Simulated camera frame generator started");
            while camera.shared.generating.load(Ordering::SeqCst) {
                let stream_ids = {
                    let state = camera.shared.state.lock();
                    camera
                        .capabilities(&state.use_case)
                        .map(|uc| uc.stream_ids.clone())
                        .unwrap_or_default()
                };

                for stream_id in stream_ids {
                    let frame = camera.synthetic_frame(stream_id);
                    trace!("Generated simulated frame for stream {}", stream_id);
                    camera.deliver(&frame);
                }

                std::thread::sleep(frame_interval);
            }
            info!("Simulated camera frame generator stopped");
        })
    }
}

impl DepthCamera for SimulatedCamera {
    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            id: format!("sim-{}", self.shared.spec.serial),
            name: self.shared.spec.name.clone(),
            serial: self.shared.spec.serial.clone(),
        }
    }

    fn access_level(&self) -> u32 {
        self.shared.state.lock().access_level
    }

    fn use_cases(&self) -> Result<Vec<String>, DeviceError> {
        self.check_connected()?;
        Ok(self
            .shared
            .spec
            .use_cases
            .iter()
            .map(|uc| uc.name.clone())
            .collect())
    }

    fn use_case_capabilities(&self, name: &str) -> Result<UseCaseCapabilities, DeviceError> {
        self.capabilities(name)
            .cloned()
            .ok_or_else(|| DeviceError::sdk("use case lookup", format!("unknown use case {name}")))
    }

    fn current_use_case(&self) -> Result<String, DeviceError> {
        self.check_connected()?;
        Ok(self.shared.state.lock().use_case.clone())
    }

    fn set_use_case(&mut self, name: &str) -> Result<(), DeviceError> {
        self.check_connected()?;
        let required = self
            .capabilities(name)
            .map(|uc| uc.min_access_level)
            .ok_or_else(|| DeviceError::sdk("set use case", format!("unknown use case {name}")))?;

        let mut state = self.shared.state.lock();
        if state.capturing {
            return Err(DeviceError::sdk(
                "set use case",
                "cannot switch use case while capturing",
            ));
        }
        if state.access_level < required {
            return Err(DeviceError::sdk("set use case", "insufficient access level"));
        }
        debug!("Simulated camera switched to use case {}", name);
        state.use_case = name.to_string();
        Ok(())
    }

    fn register_data_listener(&mut self, listener: DataListener) -> Result<(), DeviceError> {
        self.shared.state.lock().listener = Some(listener);
        self.shared
            .counters
            .listener_registrations
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unregister_data_listener(&mut self) -> Result<(), DeviceError> {
        self.shared.state.lock().listener = None;
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), DeviceError> {
        self.check_connected()?;
        {
            let mut state = self.shared.state.lock();
            if state.capturing {
                return Ok(());
            }
            state.capturing = true;
        }

        if let Some(fps) = self.shared.spec.fps {
            self.shared.generating.store(true, Ordering::SeqCst);
            let handle = self.spawn_generator(fps);
            self.shared.state.lock().generator = Some(handle);
        }
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), DeviceError> {
        self.shared.generating.store(false, Ordering::SeqCst);
        let generator = {
            let mut state = self.shared.state.lock();
            state.capturing = false;
            state.generator.take()
        };

        if let Some(handle) = generator {
            if handle.join().is_err() {
                warn!("Simulated frame generator panicked");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.shared.state.lock().capturing
    }

    fn lens_parameters(&self, stream_id: StreamId) -> Result<LensParameters, DeviceError> {
        self.check_connected()?;
        self.check_stream(stream_id)?;
        self.shared
            .counters
            .lens_fetches
            .fetch_add(1, Ordering::Relaxed);

        let spec = &self.shared.spec;
        Ok(LensParameters {
            principal_point: (spec.width as f32 / 2.0, spec.height as f32 / 2.0),
            focal_length: (210.0, 210.0),
            distortion_tangential: (0.001, -0.002),
            distortion_radial: vec![0.3, -1.1, 1.2],
            width: spec.width,
            height: spec.height,
        })
    }

    fn exposure_limits(&self, stream_id: StreamId) -> Result<(u32, u32), DeviceError> {
        self.check_stream(stream_id)?;
        Ok(self.shared.spec.exposure_limits)
    }

    fn set_exposure_time(&mut self, stream_id: StreamId, usecs: u32) -> Result<(), DeviceError> {
        self.check_connected()?;
        self.check_stream(stream_id)?;
        if self.shared.reject_exposure.load(Ordering::SeqCst) {
            return Err(DeviceError::sdk("set exposure time", "rejected by driver"));
        }

        let (min, max) = self.shared.spec.exposure_limits;
        if usecs < min || usecs > max {
            return Err(DeviceError::ExposureOutOfRange {
                stream_id,
                value: usecs,
                min,
                max,
            });
        }

        self.shared.state.lock().exposure.insert(stream_id, usecs);
        self.shared
            .counters
            .exposure_writes
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn exposure_mode(&self, stream_id: StreamId) -> Result<ExposureMode, DeviceError> {
        self.check_stream(stream_id)?;
        Ok(self
            .shared
            .state
            .lock()
            .modes
            .get(&stream_id)
            .copied()
            .unwrap_or(ExposureMode::Manual))
    }

    fn set_exposure_mode(
        &mut self,
        stream_id: StreamId,
        mode: ExposureMode,
    ) -> Result<(), DeviceError> {
        self.check_connected()?;
        self.check_stream(stream_id)?;
        self.shared.state.lock().modes.insert(stream_id, mode);
        Ok(())
    }
}

/// Provider over a fixed set of simulated cameras
#[derive(Clone, Default)]
pub struct SimulatedProvider {
    cameras: Arc<Mutex<Vec<SimulatedCamera>>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(camera: SimulatedCamera) -> Self {
        let provider = Self::new();
        provider.add_camera(camera);
        provider
    }

    pub fn add_camera(&self, camera: SimulatedCamera) {
        self.cameras.lock().push(camera);
    }
}

impl CameraProvider for SimulatedProvider {
    fn open(&self, serial: &str, access_code: &str) -> Result<Box<dyn DepthCamera>, DeviceError> {
        let camera = self
            .cameras
            .lock()
            .iter()
            .filter(|camera| camera.shared.connected.load(Ordering::SeqCst))
            .find(|camera| is_wildcard_serial(serial) || camera.shared.spec.serial == serial)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound {
                serial: serial.to_string(),
            })?;

        camera.shared.counters.opens.fetch_add(1, Ordering::Relaxed);

        let failures = &camera.shared.pending_open_failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DeviceError::sdk("open", "scripted open failure"));
        }

        camera.reset_for_open(access_code);
        info!(
            "Opened simulated camera {} ({})",
            camera.shared.spec.serial, camera.shared.spec.name
        );
        Ok(Box::new(camera))
    }
}

/// Tilted plane with a band of invalid pixels along the top row
pub fn synthetic_frame(
    stream_id: StreamId,
    width: u16,
    height: u16,
    sequence: u64,
    exposure_usecs: u32,
) -> DepthFrame {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let focal = 210.0_f32;
    let mut points = Vec::with_capacity(width as usize * height as usize);

    for v in 0..height {
        for u in 0..width {
            let z = 1.0 + 0.002 * (u as f32 + v as f32);
            let valid = v > 0;
            points.push(DepthPoint {
                x: (u as f32 - cx) * z / focal,
                y: (v as f32 - cy) * z / focal,
                z,
                noise: 0.005 * z,
                gray_value: ((u as u64 + v as u64 + sequence) % 2048) as u16,
                depth_confidence: if valid { 255 } else { 0 },
            });
        }
    }

    DepthFrame {
        stream_id,
        timestamp: SystemTime::now(),
        width,
        height,
        exposure_times: vec![exposure_usecs / 4, exposure_usecs],
        points,
    }
}
