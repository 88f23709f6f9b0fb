use super::messages::DataMessage;
use super::transport::{Endpoint, Transport};
use crate::device::StreamId;
use crate::registry::{Channel, UseCaseEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One endpoint per (stream, channel) of a use case
pub struct PublisherSet {
    generation: u64,
    use_case: String,
    endpoints: HashMap<(StreamId, Channel), Arc<dyn Endpoint>>,
    emitted: AtomicU64,
}

impl PublisherSet {
    /// Advertise every (stream, channel) pair `entry` declares
    pub fn build(transport: &dyn Transport, entry: &UseCaseEntry, generation: u64) -> Self {
        let mut endpoints = HashMap::new();

        for (index, stream) in entry.streams.iter().enumerate() {
            for &channel in &stream.channels {
                let topic = format!("stream/{}/{}", index + 1, channel.topic_suffix());
                endpoints.insert(
                    (stream.stream_id, channel),
                    transport.advertise(&topic, channel),
                );
            }
        }

        info!(
            "Publisher set generation {} built for use case {} ({} endpoints)",
            generation,
            entry.name,
            endpoints.len()
        );

        Self {
            generation,
            use_case: entry.name.clone(),
            endpoints,
            emitted: AtomicU64::new(0),
        }
    }

    /// Route a message to its endpoint. Pairs that are not materialized are
    /// dropped with a warning.
    pub fn emit(&self, stream_id: StreamId, channel: Channel, message: Arc<DataMessage>) -> bool {
        match self.endpoints.get(&(stream_id, channel)) {
            Some(endpoint) => {
                endpoint.publish(message);
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                warn!(
                    "No {} publisher for stream {} in generation {}",
                    channel, stream_id, self.generation
                );
                false
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn use_case(&self) -> &str {
        &self.use_case
    }

    pub fn is_materialized(&self, stream_id: StreamId, channel: Channel) -> bool {
        self.endpoints.contains_key(&(stream_id, channel))
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self
            .endpoints
            .values()
            .map(|e| e.topic().to_string())
            .collect();
        topics.sort();
        topics
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Drop for PublisherSet {
    fn drop(&mut self) {
        debug!(
            "Publisher set generation {} ({}) released after {} messages",
            self.generation,
            self.use_case,
            self.emitted()
        );
    }
}

impl std::fmt::Debug for PublisherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSet")
            .field("generation", &self.generation)
            .field("use_case", &self.use_case)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}
