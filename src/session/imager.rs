use super::CameraSession;
use crate::device::{ExposureMode, StreamId};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Imager settings as accepted over the JSON configuration interface.
/// Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImagerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_use_case: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_mode: Option<ExposureMode>,

    /// Stream id -> exposure time in microseconds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposure_times: BTreeMap<StreamId, u32>,
}

/// `{"Imager": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ImagerConfig {
    #[serde(rename = "Imager", default)]
    pub imager: ImagerSettings,
}

impl ImagerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl CameraSession {
    /// Apply a JSON imager configuration.
    ///
    /// The use case switch behaves like [`CameraSession::configure`] and its
    /// error is returned. Exposure settings are applied afterwards to the
    /// streams of the resulting use case and only logged on failure.
    pub fn apply_config(&self, json: &str) -> Result<()> {
        let config = ImagerConfig::from_json(json)?;
        self.apply_imager_settings(&config.imager)
    }

    pub fn apply_imager_settings(&self, settings: &ImagerSettings) -> Result<()> {
        if let Some(use_case) = &settings.current_use_case {
            self.configure(use_case)?;
        }

        if let Some(mode) = settings.exposure_mode {
            self.set_exposure_mode_all(mode);
        }

        if !settings.exposure_times.is_empty() {
            self.set_exposure_times(&settings.exposure_times);
        }

        info!("Imager configuration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepthcamError;

    #[test]
    fn test_parse_full_config() {
        let config = ImagerConfig::from_json(
            r#"{
                "Imager": {
                    "CurrentUseCase": "MODE_5_45FPS_500",
                    "ExposureMode": "AUTOMATIC",
                    "ExposureTimes": {"57082": 400, "57083": 1200}
                }
            }"#,
        )
        .unwrap();

        let imager = config.imager;
        assert_eq!(imager.current_use_case.as_deref(), Some("MODE_5_45FPS_500"));
        assert_eq!(imager.exposure_mode, Some(ExposureMode::Automatic));
        assert_eq!(imager.exposure_times.get(&0xdefa), Some(&400));
        assert_eq!(imager.exposure_times.get(&0xdefb), Some(&1200));
    }

    #[test]
    fn test_parse_partial_config() {
        let config =
            ImagerConfig::from_json(r#"{"Imager": {"ExposureMode": "MANUAL"}}"#).unwrap();
        assert_eq!(config.imager.current_use_case, None);
        assert_eq!(config.imager.exposure_mode, Some(ExposureMode::Manual));
        assert!(config.imager.exposure_times.is_empty());

        let empty = ImagerConfig::from_json("{}").unwrap();
        assert_eq!(empty, ImagerConfig::default());
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            ImagerConfig::from_json(r#"{"Imager": {"ExposureMode": "SOMETIMES"}}"#),
            Err(DepthcamError::Json(_))
        ));
        assert!(matches!(
            ImagerConfig::from_json("not json"),
            Err(DepthcamError::Json(_))
        ));
    }

    #[test]
    fn test_serialize_skips_unset_fields() {
        let config = ImagerConfig {
            imager: ImagerSettings {
                current_use_case: Some("MODE_9_5FPS_2000".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(
            config.to_json().unwrap(),
            r#"{"Imager":{"CurrentUseCase":"MODE_9_5FPS_2000"}}"#
        );
    }
}
