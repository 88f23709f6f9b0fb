use super::messages::DataMessage;
use crate::registry::Channel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// A single advertised output
pub trait Endpoint: Send + Sync {
    fn topic(&self) -> &str;

    /// Hand a message to the transport. Must not block on consumers.
    fn publish(&self, message: Arc<DataMessage>);
}

/// Message transport the publisher set advertises endpoints on
pub trait Transport: Send + Sync {
    fn advertise(&self, topic: &str, channel: Channel) -> Arc<dyn Endpoint>;
}

/// In-process transport backed by one broadcast channel per topic
pub struct BroadcastTransport {
    topics: Mutex<HashMap<String, broadcast::Sender<Arc<DataMessage>>>>,
    capacity: usize,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Arc<DataMessage>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a topic, whether or not it is currently advertised
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<DataMessage>> {
        self.sender(topic).subscribe()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Transport for BroadcastTransport {
    fn advertise(&self, topic: &str, channel: Channel) -> Arc<dyn Endpoint> {
        debug!("Advertising {} on topic {}", channel, topic);
        Arc::new(BroadcastEndpoint {
            topic: topic.to_string(),
            sender: self.sender(topic),
        })
    }
}

struct BroadcastEndpoint {
    topic: String,
    sender: broadcast::Sender<Arc<DataMessage>>,
}

impl Endpoint for BroadcastEndpoint {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, message: Arc<DataMessage>) {
        // No subscribers is not an error for a publisher
        if let Ok(receivers) = self.sender.send(message) {
            trace!("Published on {} to {} subscribers", self.topic, receivers);
        }
    }
}
