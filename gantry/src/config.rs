use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::position::{AxisLimits, Limits};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

/// Machine profile for one gantry model. Immutable once handed to the
/// controller; several profiles can coexist in one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub limits: Limits,

    /// Clearance (mm) added above the higher of the two endpoints when
    /// z-hopping between positions.
    pub zhop_height: f64,

    /// Maximum distance (mm) between the reported and target position for a
    /// move to count as complete.
    pub position_tolerance: f64,

    /// Wall-clock budget for confirming a single primitive move.
    pub move_timeout_ms: u64,

    /// Wall-clock budget for the post-home position report. Homing takes tens
    /// of seconds and the firmware answers queries with busy lines meanwhile.
    pub homing_timeout_ms: u64,

    /// Settle delay between sending a command and polling for the reply.
    pub polling_interval_ms: u64,

    /// Upper bound on re-sent position queries before giving up.
    pub query_retries: u32,

    /// Maximum feed rate (mm/min) the machine accepts.
    pub max_feed_rate: u32,

    /// Whether moves hop by default when the caller does not say.
    pub zhop_default: bool,

    pub baud_rate: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            limits: Limits {
                x: AxisLimits::new(0.0, 235.0),
                y: AxisLimits::new(0.0, 235.0),
                z: AxisLimits::new(0.0, 250.0),
            },
            zhop_height: 5.0,
            position_tolerance: 0.1,
            move_timeout_ms: 10_000,
            homing_timeout_ms: 60_000,
            polling_interval_ms: 10,
            query_retries: 50,
            max_feed_rate: 10_000,
            zhop_default: false,
            baud_rate: 115_200,
        }
    }
}

impl MachineConfig {
    /// Profile for an Ender 3 board: same travel, much faster polling, a
    /// short confirmation window, and z-hop on by default since the work
    /// area usually holds labware.
    pub fn ender3() -> Self {
        Self {
            move_timeout_ms: 100,
            polling_interval_ms: 1,
            zhop_default: true,
            ..Self::default()
        }
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    pub fn homing_timeout(&self) -> Duration {
        Duration::from_millis(self.homing_timeout_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, limits) in [
            ("x", self.limits.x),
            ("y", self.limits.y),
            ("z", self.limits.z),
        ] {
            if limits.min > limits.max {
                return Err(ConfigError::ValidationError {
                    message: format!(
                        "{} limits are inverted: [{}, {}]",
                        axis, limits.min, limits.max
                    ),
                });
            }
        }

        if self.position_tolerance <= 0.0 {
            return Err(ConfigError::ValidationError {
                message: "position tolerance must be positive".to_string(),
            });
        }

        if self.zhop_height < 0.0 {
            return Err(ConfigError::ValidationError {
                message: "z-hop height cannot be negative".to_string(),
            });
        }

        if self.max_feed_rate == 0 {
            return Err(ConfigError::ValidationError {
                message: "maximum feed rate must be positive".to_string(),
            });
        }

        if self.query_retries == 0 {
            return Err(ConfigError::ValidationError {
                message: "query retry budget must be at least 1".to_string(),
            });
        }

        if self.homing_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "homing timeout must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("gantry_config.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn load(&self) -> anyhow::Result<MachineConfig> {
        let config_path = self.options.config_path.clone();

        if !config_path.exists() {
            if self.options.create_if_missing {
                let default_config = MachineConfig::default();
                self.save(&default_config)
                    .context("Failed to save default config")?;
                return Ok(default_config);
            } else {
                return Err(ConfigError::FileNotFound { path: config_path }.into());
            }
        }

        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError { source: e })?;

        let config: MachineConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config: &MachineConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_matches_the_generic_gantry() {
        let config = MachineConfig::default();

        assert_eq!(config.limits.x.max, 235.0);
        assert_eq!(config.limits.z.max, 250.0);
        assert_eq!(config.max_feed_rate, 10_000);
        assert!(!config.zhop_default);
        config.validate().unwrap();
    }

    #[test]
    fn ender3_preset_polls_faster_and_hops_by_default() {
        let config = MachineConfig::ender3();

        assert_eq!(config.polling_interval(), Duration::from_millis(1));
        assert_eq!(config.move_timeout(), Duration::from_millis(100));
        assert!(config.zhop_default);
        config.validate().unwrap();
    }

    #[test]
    fn validation_rejects_inverted_limits() {
        let mut config = MachineConfig::default();
        config.limits.y = AxisLimits::new(10.0, 0.0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_tolerance() {
        let mut config = MachineConfig::default();
        config.position_tolerance = 0.0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn profile_parses_from_toml() {
        let config: MachineConfig = toml::from_str(
            r#"
            zhop_height = 5.0
            position_tolerance = 0.1
            move_timeout_ms = 10000
            homing_timeout_ms = 60000
            polling_interval_ms = 10
            query_retries = 50
            max_feed_rate = 10000
            zhop_default = false
            baud_rate = 115200

            [limits.x]
            min = 0.0
            max = 235.0

            [limits.y]
            min = 0.0
            max = 220.0

            [limits.z]
            min = 0.0
            max = 250.0
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.y.max, 220.0);
        assert_eq!(config.baud_rate, 115_200);
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gantry-config-{}-{}", std::process::id(), name))
    }

    #[test]
    fn profile_survives_a_save_load_round_trip() {
        let path = scratch_path("roundtrip.toml");
        let manager = ConfigManager::with_options(ConfigOptions::with_path(&path));

        let mut config = MachineConfig::ender3();
        config.limits.y = AxisLimits::new(0.0, 220.0);
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);

        fs::remove_file(path).ok();
    }

    #[test]
    fn load_rejects_a_saved_profile_that_fails_validation() {
        let path = scratch_path("invalid.toml");
        let manager = ConfigManager::with_options(ConfigOptions::with_path(&path));

        let mut config = MachineConfig::default();
        config.position_tolerance = 0.0;
        manager.save(&config).unwrap();

        assert!(manager.load().is_err());

        fs::remove_file(path).ok();
    }

    #[test]
    fn load_writes_the_default_profile_when_the_file_is_missing() {
        let path = scratch_path("created.toml");
        fs::remove_file(&path).ok();

        let manager = ConfigManager::with_options(ConfigOptions {
            config_path: path.clone(),
            create_if_missing: true,
        });

        let config = manager.load().unwrap();
        assert_eq!(config, MachineConfig::default());
        assert!(path.exists());

        fs::remove_file(path).ok();
    }

    #[test]
    fn load_fails_when_the_file_is_missing_and_creation_is_off() {
        let path = scratch_path("absent.toml");
        fs::remove_file(&path).ok();

        let manager = ConfigManager::with_options(ConfigOptions {
            config_path: path,
            create_if_missing: false,
        });

        assert!(manager.load().is_err());
    }
}
