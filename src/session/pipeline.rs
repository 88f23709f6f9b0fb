use super::state::Topology;
use crate::device::{DataListener, DepthFrame, StreamId};
use crate::error::FrameError;
use crate::publisher::FrameContext;
use crate::stats::PipelineStats;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, trace, warn};

/// Time of the last frame that made it through the pipeline
#[derive(Debug, Clone, Copy)]
pub struct LivenessMark {
    /// Monotonic instant the frame finished processing (reset on start)
    pub processed_at: Instant,
    /// Device timestamp of that frame, `None` until the first frame
    pub frame_stamp: Option<SystemTime>,
}

/// State guarded by the frame-processing lock
struct FrameState {
    topology: Option<Arc<Topology>>,
    liveness: LivenessMark,
    sequences: HashMap<StreamId, u64>,
}

/// The camera's data callback: demultiplexes frames by stream and emits one
/// message per declared channel.
pub struct FramePipeline {
    state: Mutex<FrameState>,
    stats: PipelineStats,
    optical_frame: String,
    sensor_frame: String,
}

impl FramePipeline {
    pub fn new(optical_frame: String, sensor_frame: String) -> Self {
        Self {
            state: Mutex::new(FrameState {
                topology: None,
                liveness: LivenessMark {
                    processed_at: Instant::now(),
                    frame_stamp: None,
                },
                sequences: HashMap::new(),
            }),
            stats: PipelineStats::new(),
            optical_frame,
            sensor_frame,
        }
    }

    /// Closure handed to the camera driver
    pub fn listener(self: &Arc<Self>) -> DataListener {
        let pipeline = Arc::clone(self);
        Arc::new(move |frame: &DepthFrame| pipeline.on_new_data(frame))
    }

    /// Process one frame. Runs on the driver's thread.
    pub fn on_new_data(&self, frame: &DepthFrame) {
        let mut state = self.state.lock();
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let Some(topology) = state.topology.clone() else {
            self.stats
                .dropped_not_streaming
                .fetch_add(1, Ordering::Relaxed);
            trace!("Dropping frame for stream {}: not streaming", frame.stream_id);
            return;
        };

        match self.publish(&topology, frame, &mut state.sequences) {
            Ok((seq, emitted)) => {
                state.liveness = LivenessMark {
                    processed_at: Instant::now(),
                    frame_stamp: Some(frame.timestamp),
                };
                self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Frame {} of stream {} published as {} messages",
                    seq,
                    frame.stream_id,
                    emitted
                );
            }
            Err(e) => {
                warn!("Dropping frame: {}", e);
                self.stats.record_drop(&e);
            }
        }
    }

    fn publish(
        &self,
        topology: &Topology,
        frame: &DepthFrame,
        sequences: &mut HashMap<StreamId, u64>,
    ) -> Result<(u64, usize), FrameError> {
        let stream = topology
            .entry
            .stream(frame.stream_id)
            .ok_or(FrameError::UnknownStreamId(frame.stream_id))?;

        let calibration = topology.calibration.get(frame.stream_id)?;

        if !frame.validate_size() {
            return Err(FrameError::MalformedPayload {
                stream_id: frame.stream_id,
                details: format!(
                    "{} points for a {}x{} frame",
                    frame.points.len(),
                    frame.width,
                    frame.height
                ),
            });
        }

        let counter = sequences.entry(frame.stream_id).or_insert(0);
        let seq = *counter;
        *counter += 1;

        let ctx = FrameContext {
            frame,
            seq,
            optical_frame: &self.optical_frame,
            sensor_frame: &self.sensor_frame,
            calibration: &calibration,
        };

        let mut emitted = 0;
        for &channel in &stream.channels {
            let message = Arc::new(ctx.build(channel));
            if topology.publishers.emit(frame.stream_id, channel, message) {
                emitted += 1;
                self.stats.messages_emitted.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats
                    .unmaterialized_emits
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok((seq, emitted))
    }

    /// Install a new topology (or none to pause) and return the previous one.
    /// Holds the frame lock only for the swap.
    pub(crate) fn swap_topology(&self, topology: Option<Arc<Topology>>) -> Option<Arc<Topology>> {
        let mut state = self.state.lock();
        match &topology {
            Some(t) => debug!(
                "Installing topology for use case {} (publisher generation {})",
                t.entry.name,
                t.publishers.generation()
            ),
            None => debug!("Clearing streaming topology"),
        }
        std::mem::replace(&mut state.topology, topology)
    }

    pub(crate) fn reset_liveness(&self, now: Instant) {
        let mut state = self.state.lock();
        state.liveness = LivenessMark {
            processed_at: now,
            frame_stamp: None,
        };
    }

    pub fn liveness(&self) -> LivenessMark {
        self.state.lock().liveness
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().topology.is_some()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}
