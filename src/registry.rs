use crate::device::{DepthCamera, StreamId};
use crate::error::{DepthcamError, DeviceError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Output data kind published per stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Cloud,
    Gray,
    Noise,
    Confidence,
    Xyz,
    Exposure,
    CameraInfo,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Cloud,
        Channel::Gray,
        Channel::Noise,
        Channel::Confidence,
        Channel::Xyz,
        Channel::Exposure,
        Channel::CameraInfo,
    ];

    /// Channels available for a stream that delivers no depth data
    pub const GRAY_ONLY: [Channel; 3] = [Channel::Gray, Channel::Exposure, Channel::CameraInfo];

    /// Topic suffix under `stream/<n>/`
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            Channel::Cloud => "cloud",
            Channel::Gray => "gray",
            Channel::Noise => "noise",
            Channel::Confidence => "conf",
            Channel::Xyz => "xyz",
            Channel::Exposure => "exposure_times",
            Channel::CameraInfo => "camera_info",
        }
    }

    /// Whether messages on this channel carry calibration
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            Channel::Cloud | Channel::Gray | Channel::Noise | Channel::Confidence | Channel::Xyz
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_suffix())
    }
}

/// One logical stream of a use case and the channels published for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub stream_id: StreamId,
    pub channels: Vec<Channel>,
}

impl StreamDescriptor {
    pub fn publishes(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

/// Named capture mode with its ordered stream list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UseCaseEntry {
    pub name: String,
    pub min_access_level: u32,
    pub streams: Vec<StreamDescriptor>,
}

impl UseCaseEntry {
    /// Position of `stream_id` in the stream list
    pub fn position(&self, stream_id: StreamId) -> Option<usize> {
        self.streams.iter().position(|s| s.stream_id == stream_id)
    }

    pub fn stream(&self, stream_id: StreamId) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(|s| s.stream_id).collect()
    }
}

/// Use case name -> stream layout, built from the camera's capability report
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    entries: BTreeMap<String, Arc<UseCaseEntry>>,
}

impl StreamRegistry {
    /// Enumerate every use case the camera reports
    pub fn from_device(device: &dyn DepthCamera) -> std::result::Result<Self, DeviceError> {
        let mut registry = Self::default();

        for name in device.use_cases()? {
            let caps = device.use_case_capabilities(&name)?;
            let channels: &[Channel] = if caps.has_depth {
                &Channel::ALL
            } else {
                &Channel::GRAY_ONLY
            };

            let streams = caps
                .stream_ids
                .iter()
                .map(|&stream_id| StreamDescriptor {
                    stream_id,
                    channels: channels.to_vec(),
                })
                .collect::<Vec<_>>();

            debug!(
                "Use case {} -> streams {:?} (min access level {})",
                name, caps.stream_ids, caps.min_access_level
            );

            registry.insert(UseCaseEntry {
                name,
                min_access_level: caps.min_access_level,
                streams,
            });
        }

        info!("Stream registry built with {} use cases", registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, entry: UseCaseEntry) {
        self.entries.insert(entry.name.clone(), Arc::new(entry));
    }

    /// Look up a use case by name
    pub fn resolve(&self, name: &str) -> Result<Arc<UseCaseEntry>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| DepthcamError::unknown_use_case(name))
    }

    pub fn use_case_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<UseCaseEntry>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
