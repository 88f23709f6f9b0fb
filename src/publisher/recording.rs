use super::messages::DataMessage;
use super::transport::{Endpoint, Transport};
use crate::registry::Channel;
use parking_lot::Mutex;
use std::sync::Arc;

/// A message as seen by the transport
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Serial of the endpoint it went through, in advertise order starting at 1
    pub endpoint: u64,
    pub topic: String,
    pub message: Arc<DataMessage>,
}

#[derive(Default)]
struct Log {
    advertised: Vec<(u64, String, Channel)>,
    published: Vec<Recorded>,
}

/// Transport that keeps every advertisement and message for inspection
#[derive(Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Log>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertised(&self) -> Vec<(u64, String, Channel)> {
        self.log.lock().advertised.clone()
    }

    /// Highest endpoint serial handed out so far
    pub fn last_endpoint(&self) -> u64 {
        self.log.lock().advertised.len() as u64
    }

    pub fn published(&self) -> Vec<Recorded> {
        self.log.lock().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Recorded> {
        self.log
            .lock()
            .published
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().published.clear();
    }
}

impl Transport for RecordingTransport {
    fn advertise(&self, topic: &str, channel: Channel) -> Arc<dyn Endpoint> {
        let mut log = self.log.lock();
        let serial = log.advertised.len() as u64 + 1;
        log.advertised.push((serial, topic.to_string(), channel));
        Arc::new(RecordingEndpoint {
            serial,
            topic: topic.to_string(),
            log: Arc::clone(&self.log),
        })
    }
}

struct RecordingEndpoint {
    serial: u64,
    topic: String,
    log: Arc<Mutex<Log>>,
}

impl Endpoint for RecordingEndpoint {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, message: Arc<DataMessage>) {
        self.log.lock().published.push(Recorded {
            endpoint: self.serial,
            topic: self.topic.clone(),
            message,
        });
    }
}
