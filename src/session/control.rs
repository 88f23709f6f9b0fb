use super::state::{SessionState, Topology};
use super::watchdog::{liveness_expired, WatchdogVerdict};
use super::CameraSession;
use crate::calibration::CalibrationCache;
use crate::device::{ExposureMode, StreamId};
use crate::error::{DepthcamError, Result};
use crate::publisher::PublisherSet;
use crate::registry::{StreamRegistry, UseCaseEntry};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

fn check_access(entry: &UseCaseEntry, granted: u32) -> Result<()> {
    if granted < entry.min_access_level {
        return Err(DepthcamError::AccessDenied {
            use_case: entry.name.clone(),
            required: entry.min_access_level,
            granted,
        });
    }
    Ok(())
}

impl CameraSession {
    /// Open the camera and select the initial use case.
    ///
    /// A no-op when already connected.
    pub fn connect(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return Err(DepthcamError::system("Session has been shut down"));
        }
        if state.device.is_some() {
            debug!("Camera already connected");
            return Ok(());
        }

        self.connect_locked(&mut state, None)?;
        state.recovery.clear_pending();
        Ok(())
    }

    /// Switch the active use case. While streaming, capture is paused for the
    /// switch and resumed on the new topology.
    pub fn configure(&self, use_case: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.configure_locked(&mut state, use_case)
    }

    /// Begin streaming with the active use case
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.streaming {
            return Err(DepthcamError::AlreadyStreaming);
        }
        self.start_locked(&mut state, Instant::now())?;
        info!(
            "Streaming started (use case {})",
            state.active_use_case_name().unwrap_or_default()
        );
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.streaming {
            return Err(DepthcamError::NotStreaming);
        }
        self.stop_locked(&mut state);
        info!("Streaming stopped");
        Ok(())
    }

    /// Close and reopen the camera, resuming streaming if it was active
    pub fn reconnect(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return Err(DepthcamError::system("Session has been shut down"));
        }
        let resume =
            state.streaming || (state.recovery.pending && state.recovery.resume_streaming);
        self.reconnect_locked(&mut state, resume, Instant::now())
    }

    /// Stop streaming and release the camera. Later control calls fail.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return;
        }
        if state.streaming {
            self.stop_locked(&mut state);
        }
        state.watchdog.disarm();
        self.teardown(&mut state);
        state.recovery.clear_pending();
        state.shut_down = true;
        info!("Camera session {} shut down", self.inner.session_id);
    }

    /// Set one stream's exposure time in microseconds. Failures are logged.
    pub fn set_exposure_time(&self, stream_id: StreamId, usecs: u32) {
        let mut state = self.inner.state.lock();
        apply_exposure_time(&mut state, stream_id, usecs);
    }

    /// Set several exposure times under one lock hold
    pub fn set_exposure_times(&self, times: &BTreeMap<StreamId, u32>) {
        let mut state = self.inner.state.lock();
        for (&stream_id, &usecs) in times {
            apply_exposure_time(&mut state, stream_id, usecs);
        }
    }

    pub fn set_exposure_mode(&self, stream_id: StreamId, mode: ExposureMode) {
        let mut state = self.inner.state.lock();
        apply_exposure_mode(&mut state, stream_id, mode);
    }

    /// Apply `mode` to every stream of the active use case
    pub fn set_exposure_mode_all(&self, mode: ExposureMode) {
        let mut state = self.inner.state.lock();
        let stream_ids = state
            .active_use_case
            .as_ref()
            .map(|entry| entry.stream_ids())
            .unwrap_or_default();
        for stream_id in stream_ids {
            apply_exposure_mode(&mut state, stream_id, mode);
        }
    }

    /// One watchdog firing at `now`.
    ///
    /// While streaming, reconnects when no frame was processed within the
    /// timeout. After a failed reconnect, retries once per timeout interval.
    pub fn watchdog_tick(&self, now: Instant) -> WatchdogVerdict {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return WatchdogVerdict::Idle;
        }
        let timeout = state.watchdog.timeout();

        if state.streaming {
            let mark = self.inner.pipeline.liveness();
            if !liveness_expired(now, mark.processed_at, timeout) {
                return WatchdogVerdict::Healthy;
            }
            warn!(
                "No frames for {:?} (timeout {:?}), reconnecting camera",
                now.saturating_duration_since(mark.processed_at),
                timeout
            );
            return match self.reconnect_locked(&mut state, true, now) {
                Ok(()) => WatchdogVerdict::Reconnected,
                Err(_) => WatchdogVerdict::ReconnectFailed,
            };
        }

        if state.recovery.pending {
            let due = state
                .recovery
                .last_attempt
                .map(|last| now.saturating_duration_since(last) >= timeout)
                .unwrap_or(true);
            if !due {
                return WatchdogVerdict::Waiting;
            }
            let resume = state.recovery.resume_streaming;
            return match self.reconnect_locked(&mut state, resume, now) {
                Ok(()) => WatchdogVerdict::Reconnected,
                Err(_) => WatchdogVerdict::ReconnectFailed,
            };
        }

        WatchdogVerdict::Idle
    }

    /// Open the camera, build the registry and select a use case. On any
    /// failure the opened device is dropped and `state` is left untouched.
    fn connect_locked(&self, state: &mut SessionState, preferred: Option<&str>) -> Result<()> {
        let settings = &self.inner.settings;
        info!("Opening camera '{}'", settings.serial_number);

        let mut device = self
            .inner
            .provider
            .open(&settings.serial_number, &settings.access_code)
            .map_err(|e| DepthcamError::DeviceOpen {
                serial: settings.serial_number.clone(),
                details: e.to_string(),
            })?;

        let identity = device.identity();
        let access_level = device.access_level();
        let registry = StreamRegistry::from_device(&*device)?;

        let target = match preferred {
            Some(name) => name.to_string(),
            None if !settings.initial_use_case.is_empty() => settings.initial_use_case.clone(),
            None => device.current_use_case()?,
        };
        let entry = registry.resolve(&target)?;
        check_access(&entry, access_level)?;

        if device.current_use_case()? != entry.name {
            device.set_use_case(&entry.name)?;
        }

        let mut calibration = CalibrationCache::new();
        calibration.refresh(&*device, &entry, &settings.optical_frame)?;

        info!(
            "Connected to {} (serial {}, access level {}, use case {})",
            identity.name, identity.serial, access_level, entry.name
        );

        state.device = Some(device);
        state.identity = Some(identity);
        state.access_level = access_level;
        state.registry = registry;
        state.calibration = calibration;
        state.active_use_case = Some(entry);
        state.publishers = None;
        Ok(())
    }

    fn configure_locked(&self, state: &mut SessionState, use_case: &str) -> Result<()> {
        if state.device.is_none() {
            return Err(DepthcamError::NotConnected);
        }

        let entry = state.registry.resolve(use_case)?;
        check_access(&entry, state.access_level)?;

        if state
            .active_use_case
            .as_ref()
            .is_some_and(|active| active.name == entry.name)
        {
            debug!("Use case {} already active", entry.name);
            return Ok(());
        }

        if !state.streaming {
            self.apply_use_case(state, &entry)?;
            info!("Use case switched to {}", entry.name);
            return Ok(());
        }

        // Stopping capture drops whatever the camera still has queued; frames
        // already inside the callback finish on the old topology.
        if let Some(device) = state.device.as_mut() {
            device.stop_capture()?;
        }
        let previous = self.inner.pipeline.swap_topology(None);

        if let Err(e) = self.apply_use_case(state, &entry) {
            warn!(
                "Use case switch to {} failed, resuming previous topology: {}",
                entry.name, e
            );
            self.inner.pipeline.swap_topology(previous);
            if let Some(device) = state.device.as_mut() {
                if let Err(restart) = device.start_capture() {
                    error!("Failed to resume capture: {}", restart);
                }
            }
            return Err(e);
        }
        drop(previous);

        let topology = self.build_topology(state, &entry);
        self.inner.pipeline.reset_liveness(Instant::now());
        self.inner.pipeline.swap_topology(Some(topology));

        if let Some(device) = state.device.as_mut() {
            // The watchdog reconnects if capture does not come back
            if let Err(e) = device.start_capture() {
                error!("Failed to resume capture after use case switch: {}", e);
            }
        }

        info!("Use case switched to {} while streaming", entry.name);
        Ok(())
    }

    /// Select `entry` on the camera and refresh calibration for it. The
    /// camera is switched back if calibration cannot be fetched.
    fn apply_use_case(&self, state: &mut SessionState, entry: &Arc<UseCaseEntry>) -> Result<()> {
        let device = state.device.as_mut().ok_or(DepthcamError::NotConnected)?;
        device.set_use_case(&entry.name)?;

        if let Err(e) =
            state
                .calibration
                .refresh(&**device, entry, &self.inner.settings.optical_frame)
        {
            if let Some(previous) = &state.active_use_case {
                if let Err(revert) = device.set_use_case(&previous.name) {
                    error!("Failed to restore use case {}: {}", previous.name, revert);
                }
            }
            return Err(e.into());
        }

        state.active_use_case = Some(Arc::clone(entry));
        Ok(())
    }

    /// Materialize a new publisher generation and the topology frames will
    /// be demultiplexed against
    fn build_topology(&self, state: &mut SessionState, entry: &Arc<UseCaseEntry>) -> Arc<Topology> {
        state.publisher_generation += 1;
        let publishers = Arc::new(PublisherSet::build(
            self.inner.transport.as_ref(),
            entry,
            state.publisher_generation,
        ));
        state.publishers = Some(Arc::clone(&publishers));

        Arc::new(Topology {
            entry: Arc::clone(entry),
            calibration: state.calibration.clone(),
            publishers,
        })
    }

    fn start_locked(&self, state: &mut SessionState, now: Instant) -> Result<()> {
        let entry = state
            .active_use_case
            .clone()
            .ok_or(DepthcamError::NotConnected)?;
        let device = state.device.as_mut().ok_or(DepthcamError::NotConnected)?;
        state
            .calibration
            .ensure(&**device, &entry, &self.inner.settings.optical_frame)?;

        let topology = self.build_topology(state, &entry);
        self.inner.pipeline.reset_liveness(now);
        self.inner.pipeline.swap_topology(Some(topology));

        let listener = self.inner.pipeline.listener();
        let device = state.device.as_mut().ok_or(DepthcamError::NotConnected)?;
        let started = device
            .register_data_listener(listener)
            .and_then(|()| device.start_capture());

        if let Err(e) = started {
            if let Err(unregister) = device.unregister_data_listener() {
                warn!("Failed to unregister listener: {}", unregister);
            }
            self.inner.pipeline.swap_topology(None);
            state.publishers = None;
            return Err(e.into());
        }

        state.streaming = true;
        state.watchdog.arm(Arc::downgrade(&self.inner));
        Ok(())
    }

    /// Stop capture and unregister the callback before the publishers are
    /// released
    fn stop_locked(&self, state: &mut SessionState) {
        state.watchdog.disarm();

        if let Some(device) = state.device.as_mut() {
            if let Err(e) = device.stop_capture() {
                warn!("Failed to stop capture: {}", e);
            }
            if let Err(e) = device.unregister_data_listener() {
                warn!("Failed to unregister listener: {}", e);
            }
        }

        self.inner.pipeline.swap_topology(None);
        state.publishers = None;
        state.streaming = false;
        state.recovery.clear_pending();
    }

    /// Release the camera. The device is gone before the state reads as
    /// disconnected.
    fn teardown(&self, state: &mut SessionState) {
        if let Some(mut device) = state.device.take() {
            if state.streaming {
                if let Err(e) = device.stop_capture() {
                    warn!("Failed to stop capture during teardown: {}", e);
                }
                if let Err(e) = device.unregister_data_listener() {
                    warn!("Failed to unregister listener during teardown: {}", e);
                }
            }
            drop(device);
            debug!("Camera handle released");
        }

        self.inner.pipeline.swap_topology(None);
        state.publishers = None;
        state.streaming = false;
        state.calibration.invalidate();
    }

    fn reconnect_locked(&self, state: &mut SessionState, resume: bool, now: Instant) -> Result<()> {
        info!("Reconnecting camera (resume streaming: {})", resume);
        state.recovery.begin(now);

        // Reopen into the use case that was active before the fault
        let preferred = state.active_use_case_name();
        self.teardown(state);

        let mut result = self.connect_locked(state, preferred.as_deref());
        if result.is_ok() && resume {
            result = self.start_locked(state, now);
        }

        match &result {
            Ok(()) => {
                state.recovery.succeeded();
                if !resume {
                    state.watchdog.disarm();
                }
                info!("Camera reconnected");
            }
            Err(e) => {
                error!("Camera reconnect failed: {}", e);
                state.recovery.failed(e.to_string(), resume);
                if resume {
                    state.watchdog.arm(Arc::downgrade(&self.inner));
                }
            }
        }
        result
    }
}

fn apply_exposure_time(state: &mut SessionState, stream_id: StreamId, usecs: u32) -> bool {
    let Some(device) = state.device.as_mut() else {
        warn!(
            "Ignoring exposure time for stream {}: camera not connected",
            stream_id
        );
        return false;
    };

    let declared = state
        .active_use_case
        .as_ref()
        .is_some_and(|entry| entry.stream(stream_id).is_some());
    if !declared {
        warn!(
            "Ignoring exposure time for unknown stream {}",
            stream_id
        );
        return false;
    }

    match device.exposure_limits(stream_id) {
        Ok((min, max)) if usecs < min || usecs > max => {
            warn!(
                "Ignoring exposure time {}us for stream {}: outside [{}, {}]",
                usecs, stream_id, min, max
            );
            return false;
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Cannot read exposure limits for stream {}: {}", stream_id, e);
            return false;
        }
    }

    match device.set_exposure_time(stream_id, usecs) {
        Ok(()) => {
            debug!("Exposure time of stream {} set to {}us", stream_id, usecs);
            true
        }
        Err(e) => {
            warn!("Failed to set exposure time of stream {}: {}", stream_id, e);
            false
        }
    }
}

fn apply_exposure_mode(state: &mut SessionState, stream_id: StreamId, mode: ExposureMode) -> bool {
    let Some(device) = state.device.as_mut() else {
        warn!(
            "Ignoring exposure mode for stream {}: camera not connected",
            stream_id
        );
        return false;
    };

    let declared = state
        .active_use_case
        .as_ref()
        .is_some_and(|entry| entry.stream(stream_id).is_some());
    if !declared {
        warn!("Ignoring exposure mode for unknown stream {}", stream_id);
        return false;
    }

    match device.set_exposure_mode(stream_id, mode) {
        Ok(()) => {
            debug!("Exposure mode of stream {} set to {:?}", stream_id, mode);
            true
        }
        Err(e) => {
            warn!("Failed to set exposure mode of stream {}: {}", stream_id, e);
            false
        }
    }
}
