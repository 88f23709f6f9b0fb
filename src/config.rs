use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for watchdog poll interval and timeout
pub const MAX_WATCHDOG_SECS: f64 = 86_400.0;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DepthcamConfig {
    pub camera: CameraConfig,
    pub watchdog: WatchdogConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Access code unlocking higher camera access levels
    #[serde(default = "default_access_code")]
    pub access_code: String,

    /// Serial number of the camera to open ("-" for the first one found)
    #[serde(default = "default_serial_number")]
    pub serial_number: String,

    /// Use case selected after connecting (empty keeps the camera's current one)
    #[serde(default = "default_initial_use_case")]
    pub initial_use_case: String,

    /// Frame images and calibration are published in
    #[serde(default = "default_optical_frame")]
    pub optical_frame: String,

    /// Frame point clouds and XYZ images are published in
    #[serde(default = "default_sensor_frame")]
    pub sensor_frame: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchdogConfig {
    /// Seconds between liveness checks
    #[serde(default = "default_poll_bus_secs")]
    pub poll_bus_secs: f64,

    /// Seconds without frames before the camera is reconnected
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        watchdog_duration(self.poll_bus_secs, default_poll_bus_secs())
    }

    pub fn timeout(&self) -> Duration {
        watchdog_duration(self.timeout_secs, default_timeout_secs())
    }
}

/// Out-of-range values fall back to `default`; `validate` rejects them up front
fn watchdog_duration(secs: f64, default: f64) -> Duration {
    if secs > 0.0 && secs <= MAX_WATCHDOG_SECS {
        Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(default))
    } else {
        Duration::from_secs_f64(default)
    }
}

fn check_watchdog_secs(name: &str, secs: f64) -> Result<(), ConfigError> {
    if !secs.is_finite() || secs <= 0.0 || secs > MAX_WATCHDOG_SECS {
        return Err(ConfigError::Message(format!(
            "Watchdog {} must be greater than 0 and at most {} (got {})",
            name, MAX_WATCHDOG_SECS, secs
        )));
    }
    Ok(())
}

/// Simulated camera used by the binary when no driver is linked
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_sim_fps")]
    pub fps: u32,

    /// Sensor resolution (width, height)
    #[serde(default = "default_sim_resolution")]
    pub resolution: (u16, u16),
}

impl DepthcamConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.access_code", default_access_code())?
            .set_default("camera.serial_number", default_serial_number())?
            .set_default("camera.initial_use_case", default_initial_use_case())?
            .set_default("camera.optical_frame", default_optical_frame())?
            .set_default("camera.sensor_frame", default_sensor_frame())?
            .set_default("watchdog.poll_bus_secs", default_poll_bus_secs())?
            .set_default("watchdog.timeout_secs", default_timeout_secs())?
            .set_default("simulation.fps", default_sim_fps())?
            .set_default(
                "simulation.resolution",
                vec![
                    default_sim_resolution().0 as u32,
                    default_sim_resolution().1 as u32,
                ],
            )?
            .add_source(File::with_name(&path_str).required(false))
            // DEPTHCAM_CAMERA__SERIAL_NUMBER=... keeps underscores inside keys intact
            .add_source(
                Environment::with_prefix("DEPTHCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: DepthcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_watchdog_secs("poll_bus_secs", self.watchdog.poll_bus_secs)?;
        check_watchdog_secs("timeout_secs", self.watchdog.timeout_secs)?;

        if self.camera.optical_frame.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera optical_frame must not be empty".to_string(),
            ));
        }

        if self.camera.sensor_frame.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera sensor_frame must not be empty".to_string(),
            ));
        }

        if self.simulation.fps == 0 {
            return Err(ConfigError::Message(
                "Simulation fps must be greater than 0".to_string(),
            ));
        }

        if self.simulation.resolution.0 == 0 || self.simulation.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Simulation resolution must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DepthcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                access_code: default_access_code(),
                serial_number: default_serial_number(),
                initial_use_case: default_initial_use_case(),
                optical_frame: default_optical_frame(),
                sensor_frame: default_sensor_frame(),
            },
            watchdog: WatchdogConfig {
                poll_bus_secs: default_poll_bus_secs(),
                timeout_secs: default_timeout_secs(),
            },
            simulation: SimulationConfig {
                fps: default_sim_fps(),
                resolution: default_sim_resolution(),
            },
        }
    }
}

// Default value functions
fn default_access_code() -> String {
    String::new()
}
fn default_serial_number() -> String {
    "-".to_string()
}
fn default_initial_use_case() -> String {
    String::new()
}
fn default_optical_frame() -> String {
    "camera_optical_link".to_string()
}
fn default_sensor_frame() -> String {
    "camera_link".to_string()
}

fn default_poll_bus_secs() -> f64 {
    1.0
}
fn default_timeout_secs() -> f64 {
    1.0
}

fn default_sim_fps() -> u32 {
    5
}
fn default_sim_resolution() -> (u16, u16) {
    (224, 171)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DepthcamConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.camera.serial_number, "-");
        assert_eq!(config.camera.optical_frame, "camera_optical_link");
        assert_eq!(config.watchdog.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.watchdog.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
serial_number = "0005-4804-0050-1622"
initial_use_case = "MODE_5_45FPS_500"
optical_frame = "tof_optical"

[watchdog]
timeout_secs = 2.5
"#
        )
        .unwrap();

        let config = DepthcamConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.camera.serial_number, "0005-4804-0050-1622");
        assert_eq!(config.camera.initial_use_case, "MODE_5_45FPS_500");
        assert_eq!(config.camera.optical_frame, "tof_optical");
        assert_eq!(config.camera.sensor_frame, "camera_link");
        assert_eq!(config.watchdog.timeout(), Duration::from_millis(2500));
        assert_eq!(config.watchdog.poll_bus_secs, 1.0);
        assert_eq!(config.simulation.resolution, (224, 171));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DepthcamConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DepthcamConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DepthcamConfig::default();

        config.watchdog.timeout_secs = 0.0;
        assert!(config.validate().is_err());
        config.watchdog.timeout_secs = 1.0;

        config.camera.sensor_frame = " ".to_string();
        assert!(config.validate().is_err());
        config.camera.sensor_frame = "camera_link".to_string();

        config.simulation.resolution = (0, 10);
        assert!(config.validate().is_err());
        config.simulation.resolution = (10, 10);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_finite_watchdog_values_rejected() {
        let mut config = DepthcamConfig::default();

        config.watchdog.timeout_secs = f64::INFINITY;
        assert!(config.validate().is_err());
        assert_eq!(config.watchdog.timeout(), Duration::from_secs(1));

        config.watchdog.timeout_secs = f64::NAN;
        assert!(config.validate().is_err());
        assert_eq!(config.watchdog.timeout(), Duration::from_secs(1));

        config.watchdog.timeout_secs = 1e300;
        assert!(config.validate().is_err());
        config.watchdog.timeout_secs = MAX_WATCHDOG_SECS;
        assert!(config.validate().is_ok());

        config.watchdog.poll_bus_secs = f64::INFINITY;
        assert!(config.validate().is_err());
        assert_eq!(config.watchdog.poll_interval(), Duration::from_secs(1));
    }
}
