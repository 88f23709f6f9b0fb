use crate::error::FrameError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated from the camera's delivery thread
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_received: AtomicU64,
    pub frames_published: AtomicU64,
    pub messages_emitted: AtomicU64,
    pub dropped_not_streaming: AtomicU64,
    pub dropped_unknown_stream: AtomicU64,
    pub dropped_malformed: AtomicU64,
    pub dropped_stale_calibration: AtomicU64,
    pub unmaterialized_emits: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_drop(&self, reason: &FrameError) {
        let counter = match reason {
            FrameError::UnknownStreamId(_) => &self.dropped_unknown_stream,
            FrameError::MalformedPayload { .. } => &self.dropped_malformed,
            FrameError::StaleCalibration(_) => &self.dropped_stale_calibration,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames dropped for any reason
    pub fn frames_dropped(&self) -> u64 {
        self.dropped_not_streaming.load(Ordering::Relaxed)
            + self.dropped_unknown_stream.load(Ordering::Relaxed)
            + self.dropped_malformed.load(Ordering::Relaxed)
            + self.dropped_stale_calibration.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PipelineCounters {
        PipelineCounters {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped(),
            messages_emitted: self.messages_emitted.load(Ordering::Relaxed),
            dropped_not_streaming: self.dropped_not_streaming.load(Ordering::Relaxed),
            dropped_unknown_stream: self.dropped_unknown_stream.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_stale_calibration: self.dropped_stale_calibration.load(Ordering::Relaxed),
            unmaterialized_emits: self.unmaterialized_emits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    pub frames_received: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub messages_emitted: u64,
    pub dropped_not_streaming: u64,
    pub dropped_unknown_stream: u64,
    pub dropped_malformed: u64,
    pub dropped_stale_calibration: u64,
    pub unmaterialized_emits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reasons_are_counted_separately() {
        let stats = PipelineStats::new();
        stats.record_drop(&FrameError::UnknownStreamId(3));
        stats.record_drop(&FrameError::UnknownStreamId(4));
        stats.record_drop(&FrameError::StaleCalibration(1));
        stats.dropped_not_streaming.fetch_add(1, Ordering::Relaxed);

        let counters = stats.snapshot();
        assert_eq!(counters.dropped_unknown_stream, 2);
        assert_eq!(counters.dropped_stale_calibration, 1);
        assert_eq!(counters.dropped_malformed, 0);
        assert_eq!(counters.frames_dropped, 4);
    }
}
