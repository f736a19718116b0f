// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! YAML configuration.
//!
//! The configuration file lives at `$CONFIG_FILE_PATH` (default
//! `config.yml`). When it does not exist, a template is written and loading
//! fails with [`ConfigError::CreatedDefault`] so the operator can fill in
//! the hub address and token. Every section except `homeassistant` is
//! optional.
//!
//! ```yaml
//! timezone: Europe/Berlin
//! homeassistant:
//!   url: http://homeassistant.local:8123
//!   token: <long-lived access token>
//!   user_id: 0123456789abcdef
//! climate:
//!   - thermostat:
//!       - climate_entity: climate.office
//!         window_entities: [binary_sensor.office_window]
//!     schedule:
//!       "06:30": 21.0
//!       "22:00": 18.0
//! ```

mod sections;
mod store;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub use sections::{
    ClimateConfig, DebouncePolicy, DefaultSceneConfig, DimmerConfig, ElevationCondition,
    HeartbeatConfig, LightReplacementConfig, MotionLightConfig, NotificationConfig,
    SceneStateConfig, SensorNotifyConfig, StateCondition, ThermostatConfig, TibberConfig,
    TimeWindow, TimedLightConfig,
};
pub use store::ConfigStore;

use crate::error::{ConfigError, ValueError};

/// Environment variable naming the configuration file.
pub const ENV_CONFIG_FILE_PATH: &str = "CONFIG_FILE_PATH";
/// Configuration file used when the variable is unset.
pub const DEFAULT_CONFIG_FILE_PATH: &str = "config.yml";
/// Environment variable overriding `logging.path`.
pub const ENV_LOG_FILE_PATH: &str = "LOG_FILE_PATH";
/// Time zone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

/// Returns the configuration path from the environment.
#[must_use]
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(ENV_CONFIG_FILE_PATH)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_PATH), PathBuf::from)
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// IANA time zone used for schedules and clock boundaries.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Hub connection.
    pub homeassistant: HomeAssistantConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Status endpoint.
    #[serde(default)]
    pub api: ApiConfig,
    /// Heating zones.
    #[serde(default, alias = "climate_configs")]
    pub climate: Vec<ClimateConfig>,
    /// Remotes.
    #[serde(default, alias = "dimmer_configs")]
    pub dimmers: Vec<DimmerConfig>,
    /// Scheduled lights.
    #[serde(default, alias = "timed_light_configs")]
    pub timed_lights: Vec<TimedLightConfig>,
    /// Motion-activated lights.
    #[serde(default, alias = "motion_light_configs")]
    pub motion_lights: Vec<MotionLightConfig>,
    /// Sensor notifications.
    #[serde(default, alias = "sensor_notify_configs")]
    pub sensor_notify: Vec<SensorNotifyConfig>,
    /// Replacement lights.
    #[serde(default, alias = "light_replacement_configs")]
    pub light_replacements: Vec<LightReplacementConfig>,
    /// Price-driven light colors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tibber: Option<TibberConfig>,
    /// Hub round-trip heartbeat.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Default for Config {
    /// The template written when no configuration file exists.
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            homeassistant: HomeAssistantConfig::default(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
            climate: Vec::new(),
            dimmers: Vec::new(),
            timed_lights: Vec::new(),
            motion_lights: Vec::new(),
            sensor_notify: Vec::new(),
            light_replacements: Vec::new(),
            tibber: None,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration at `path`, applying
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CreatedDefault`] after writing a template if
    /// the file does not exist, and the matching [`ConfigError`] if the
    /// file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::default().write(path)?;
            tracing::warn!(path = %path.display(), "Config file does not exist, created default file");
            return Err(ConfigError::CreatedDefault(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }

    /// Writes the configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] or [`ConfigError::Write`].
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, usually the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_LOG_FILE_PATH).filter(|p| !p.is_empty()) {
            self.logging.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the configured time zone.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidTimezone`] for unknown zone names.
    pub fn zone(&self) -> Result<Tz, ValueError> {
        self.timezone
            .parse()
            .map_err(|_| ValueError::InvalidTimezone(self.timezone.clone()))
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zone().map_err(|e| ConfigError::Invalid {
            key: "timezone".to_string(),
            reason: e.to_string(),
        })?;
        if self.homeassistant.url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "homeassistant.url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.api.port == 0 {
            return Err(ConfigError::Invalid {
                key: "api.port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        for (i, climate) in self.climate.iter().enumerate() {
            climate.validate(&format!("climate[{i}]"))?;
        }
        for (i, motion) in self.motion_lights.iter().enumerate() {
            motion.validate(&format!("motion_lights[{i}]"))?;
        }
        if let Some(tibber) = &self.tibber {
            tibber.validate("tibber")?;
        }
        self.heartbeat.validate("heartbeat")
    }
}

/// Hub connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`.
    pub url: String,
    /// Long-lived access token.
    pub token: String,
    /// User id the controller acts as. State changes carrying this id are
    /// not treated as manual changes.
    #[serde(
        default,
        alias = "home_automations_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            token: "token".to_string(),
            user_id: None,
        }
    }
}

/// How the log file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileMode {
    /// Keep previous content.
    #[default]
    #[serde(rename = "a", alias = "append")]
    Append,
    /// Start with an empty file.
    #[serde(rename = "w", alias = "truncate")]
    Truncate,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Optional log file. Relative paths resolve against the directory of
    /// the configuration file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Level or filter directive, e.g. `info` or `home_automations=debug`.
    pub level: String,
    /// How the log file is opened.
    pub filemode: FileMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: "info".to_string(),
            filemode: FileMode::Append,
        }
    }
}

impl LoggingConfig {
    /// Returns the log file path resolved against `base`.
    #[must_use]
    pub fn resolved_path(&self, base: &Path) -> Option<PathBuf> {
        self.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        })
    }
}

/// Status endpoint listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind to.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ApiConfig {
    /// Returns the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the host is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "api.host".to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "homeassistant:\n  url: http://hub:8123\n  token: abc\n";

    #[test]
    fn should_produce_sensible_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.api.socket_addr().unwrap().to_string(), "127.0.0.1:5000");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.filemode, FileMode::Append);
        assert!(config.heartbeat.enabled);
        assert!(config.tibber.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_accept_legacy_section_names() {
        let yaml = format!(
            "{MINIMAL}dimmer_configs:\n  - device_ieee: 'aa:bb'\n    light_entities: [light.desk]\n"
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.dimmers.len(), 1);
        assert_eq!(config.dimmers[0].light_entities, ["light.desk"]);
    }

    #[test]
    fn should_read_legacy_user_id_key() {
        let yaml = "homeassistant:\n  url: http://hub:8123\n  token: abc\n  home_automations_user_id: u1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.homeassistant.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn should_reject_unknown_timezone() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.timezone = "Mars/Olympus".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "timezone"));
    }

    #[test]
    fn should_reject_climate_zone_without_schedule() {
        let yaml = format!(
            "{MINIMAL}climate:\n  - thermostats:\n      - climate_entity: climate.office\n    schedule: {{}}\n"
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "climate[0].schedule"));
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.api.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_override_log_path_from_env() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.apply_env_overrides(|key| {
            (key == ENV_LOG_FILE_PATH).then(|| "/var/log/home.log".to_string())
        });
        assert_eq!(config.logging.path, Some(PathBuf::from("/var/log/home.log")));
    }

    #[test]
    fn should_parse_file_modes() {
        let logging: LoggingConfig = serde_yaml::from_str("filemode: w").unwrap();
        assert_eq!(logging.filemode, FileMode::Truncate);
        let logging: LoggingConfig = serde_yaml::from_str("filemode: append").unwrap();
        assert_eq!(logging.filemode, FileMode::Append);
    }

    #[test]
    fn should_resolve_relative_log_path() {
        let logging = LoggingConfig {
            path: Some(PathBuf::from("logs/home.log")),
            ..LoggingConfig::default()
        };
        assert_eq!(
            logging.resolved_path(Path::new("/etc/home")),
            Some(PathBuf::from("/etc/home/logs/home.log"))
        );
    }

    #[test]
    fn should_write_template_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::CreatedDefault(ref p) if p == &path));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.homeassistant, HomeAssistantConfig::default());
    }

    #[test]
    fn should_report_yaml_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "homeassistant: [not, a, map]\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
