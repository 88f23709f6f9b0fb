use super::{CameraSession, SessionSettings};
use crate::config::DepthcamConfig;
use crate::device::CameraProvider;
use crate::error::{DepthcamError, Result};
use crate::publisher::{BroadcastTransport, Transport};
use std::sync::Arc;

/// Builder for a camera session
pub struct CameraSessionBuilder {
    settings: Option<SessionSettings>,
    provider: Option<Arc<dyn CameraProvider>>,
    transport: Option<Arc<dyn Transport>>,
}

impl CameraSessionBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            provider: None,
            transport: None,
        }
    }

    pub fn config(mut self, config: &DepthcamConfig) -> Self {
        self.settings = Some(SessionSettings::from(config));
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Defaults to an in-process [`BroadcastTransport`]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build a disconnected session
    pub fn build(self) -> Result<CameraSession> {
        let provider = self
            .provider
            .ok_or_else(|| DepthcamError::system("Camera provider must be specified"))?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(BroadcastTransport::default()));

        Ok(CameraSession::new(
            self.settings.unwrap_or_default(),
            provider,
            transport,
        ))
    }
}

impl Default for CameraSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
