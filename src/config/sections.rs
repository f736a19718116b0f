// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-module configuration sections.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValueError};
use crate::types::{PriceLevel, RgbColor, Schedule, parse_time_of_day};

/// Default upper bound accepted by thermostats, in °C.
pub const DEFAULT_MAX_THERMOSTAT_TEMP: f64 = 29.5;
/// Default lower bound accepted by thermostats, in °C.
pub const DEFAULT_MIN_THERMOSTAT_TEMP: f64 = 4.5;
/// Default target used while heating up, in °C.
pub const DEFAULT_MAX_EFFECTIVE_THERMOSTAT_TEMP: f64 = 29.0;
/// Default target used while cooling down, in °C.
pub const DEFAULT_MIN_EFFECTIVE_THERMOSTAT_TEMP: f64 = 17.5;
/// Default manual-off override window of motion lights, in seconds.
pub const DEFAULT_OFF_OVERRIDE_SECS: f64 = 60.0;
/// Default price polling interval, in seconds.
pub const DEFAULT_TIBBER_UPDATE_INTERVAL: u64 = 60;
/// Default Tibber GraphQL endpoint.
pub const DEFAULT_TIBBER_API_URL: &str = "https://api.tibber.com/v1-beta/gql";
/// Default heartbeat switch.
pub const DEFAULT_HEARTBEAT_SWITCH: &str = "switch.home_automations_dummy";
/// Default heartbeat toggle interval, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 5;

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn check_seconds(key: String, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("expected a non-negative number of seconds, got {value}"),
        })
    }
}

fn invalid(key: String, error: &ValueError) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: error.to_string(),
    }
}

// ============================================================================
// Climate
// ============================================================================

/// A heating zone: thermostats sharing one temperature schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateConfig {
    /// Thermostats in this zone.
    #[serde(rename = "thermostat", alias = "thermostats", default)]
    pub thermostats: Vec<ThermostatConfig>,
    /// Target temperatures keyed by time of day.
    pub schedule: Schedule<f64>,
    /// Highest temperature a thermostat accepts.
    #[serde(default = "default_max_thermostat_temp")]
    pub max_thermostat_temp: f64,
    /// Lowest temperature a thermostat accepts.
    #[serde(default = "default_min_thermostat_temp")]
    pub min_thermostat_temp: f64,
    /// Target set while the room is far below the schedule.
    #[serde(default = "default_max_effective_thermostat_temp")]
    pub max_effective_thermostat_temp: f64,
    /// Target set while the room is far above the schedule.
    #[serde(default = "default_min_effective_thermostat_temp")]
    pub min_effective_thermostat_temp: f64,
}

fn default_max_thermostat_temp() -> f64 {
    DEFAULT_MAX_THERMOSTAT_TEMP
}

fn default_min_thermostat_temp() -> f64 {
    DEFAULT_MIN_THERMOSTAT_TEMP
}

fn default_max_effective_thermostat_temp() -> f64 {
    DEFAULT_MAX_EFFECTIVE_THERMOSTAT_TEMP
}

fn default_min_effective_thermostat_temp() -> f64 {
    DEFAULT_MIN_EFFECTIVE_THERMOSTAT_TEMP
}

impl ClimateConfig {
    /// Creates a zone with default temperature limits.
    #[must_use]
    pub fn new(schedule: Schedule<f64>) -> Self {
        Self {
            thermostats: Vec::new(),
            schedule,
            max_thermostat_temp: DEFAULT_MAX_THERMOSTAT_TEMP,
            min_thermostat_temp: DEFAULT_MIN_THERMOSTAT_TEMP,
            max_effective_thermostat_temp: DEFAULT_MAX_EFFECTIVE_THERMOSTAT_TEMP,
            min_effective_thermostat_temp: DEFAULT_MIN_EFFECTIVE_THERMOSTAT_TEMP,
        }
    }

    /// Adds a thermostat.
    #[must_use]
    pub fn with_thermostat(mut self, thermostat: ThermostatConfig) -> Self {
        self.thermostats.push(thermostat);
        self
    }

    /// Clamps a temperature into the range the thermostats accept.
    #[must_use]
    pub fn clamp(&self, temperature: f64) -> f64 {
        temperature.clamp(self.min_thermostat_temp, self.max_thermostat_temp)
    }

    pub(crate) fn validate(&self, key: &str) -> Result<(), ConfigError> {
        self.schedule
            .validate()
            .map_err(|e| invalid(format!("{key}.schedule"), &e))?;
        if self.min_thermostat_temp > self.max_thermostat_temp {
            return Err(ConfigError::Invalid {
                key: format!("{key}.min_thermostat_temp"),
                reason: "must not exceed max_thermostat_temp".to_string(),
            });
        }
        if self.min_effective_thermostat_temp > self.max_effective_thermostat_temp {
            return Err(ConfigError::Invalid {
                key: format!("{key}.min_effective_thermostat_temp"),
                reason: "must not exceed max_effective_thermostat_temp".to_string(),
            });
        }
        Ok(())
    }
}

/// One thermostat and the entities that influence it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermostatConfig {
    /// The climate entity that is controlled.
    pub climate_entity: String,
    /// External temperature sensor. Without one the climate entity's own
    /// reading is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_entity: Option<String>,
    /// Window contacts; any open window turns the thermostat off.
    #[serde(default)]
    pub window_entities: Vec<String>,
    /// Enable switches; any switch that is off pauses automation.
    #[serde(default)]
    pub switch_entities: Vec<String>,
}

impl ThermostatConfig {
    /// Creates a thermostat without sensors or switches.
    #[must_use]
    pub fn new(climate_entity: impl Into<String>) -> Self {
        Self {
            climate_entity: climate_entity.into(),
            temperature_entity: None,
            window_entities: Vec::new(),
            switch_entities: Vec::new(),
        }
    }

    /// Uses an external temperature sensor.
    #[must_use]
    pub fn with_temperature_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.temperature_entity = Some(entity_id.into());
        self
    }

    /// Adds a window contact.
    #[must_use]
    pub fn with_window(mut self, entity_id: impl Into<String>) -> Self {
        self.window_entities.push(entity_id.into());
        self
    }

    /// Adds an enable switch.
    #[must_use]
    pub fn with_switch(mut self, entity_id: impl Into<String>) -> Self {
        self.switch_entities.push(entity_id.into());
        self
    }
}

// ============================================================================
// Lights
// ============================================================================

/// A remote whose `on` command turns lights on at full brightness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimmerConfig {
    /// IEEE address of the remote.
    pub device_ieee: String,
    /// Lights driven by the remote.
    #[serde(default)]
    pub light_entities: Vec<String>,
}

/// Lights that follow an on/off schedule entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedLightConfig {
    /// Entity whose on/off state drives the lights.
    pub schedule_entity: String,
    /// Lights to switch.
    #[serde(default)]
    pub light_entities: Vec<String>,
    /// Optional enable switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_entity: Option<String>,
}

/// How a manual light-off suppresses motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePolicy {
    /// Motion within `off_override_time` of a manual off is ignored.
    #[default]
    OverrideWindow,
    /// Manual off never suppresses motion.
    None,
}

/// A scene selected when no other state matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSceneConfig {
    /// Scene entity id.
    pub scene: String,
}

/// Matches while the sun is below the given elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationCondition {
    /// Elevation in degrees.
    pub elevation: f64,
}

/// Matches inside a time-of-day window. A window whose start is after its
/// end wraps around midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window, inclusive.
    pub from: String,
    /// End of the window, inclusive.
    pub to: String,
}

impl TimeWindow {
    /// Parses both ends.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidTimeOfDay`] if either end is malformed.
    pub fn bounds(&self) -> Result<(NaiveTime, NaiveTime), ValueError> {
        Ok((parse_time_of_day(&self.from)?, parse_time_of_day(&self.to)?))
    }

    /// Returns `true` if `now` falls inside the window. Both ends are
    /// inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidTimeOfDay`] if either end is malformed.
    pub fn contains(&self, now: NaiveTime) -> Result<bool, ValueError> {
        let (from, to) = self.bounds()?;
        Ok(Self::contains_between(from, to, now))
    }

    pub(crate) fn contains_between(from: NaiveTime, to: NaiveTime, now: NaiveTime) -> bool {
        if from <= to {
            from <= now && now <= to
        } else {
            now >= from || now <= to
        }
    }
}

/// A scene guarded by exactly one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneStateConfig {
    /// Scene entity id.
    pub scene: String,
    /// Sun elevation condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_state: Option<ElevationCondition>,
    /// Time window condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_state: Option<TimeWindow>,
}

/// Motion-activated lights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionLightConfig {
    /// Name used in log messages.
    pub name: String,
    /// Scene used when no state matches.
    pub default_state: DefaultSceneConfig,
    /// Lights that must all be off before a scene is activated. They are
    /// also watched for manual changes.
    #[serde(default)]
    pub light_on_entities: Vec<String>,
    /// Lights turned off after motion ends. Defaults to
    /// `light_on_entities` when empty.
    #[serde(default)]
    pub light_off_entities: Vec<String>,
    /// Motion sensors.
    #[serde(default)]
    pub motion_entities: Vec<String>,
    /// Enable switches; any switch that is off disables the module.
    #[serde(default)]
    pub switch_entities: Vec<String>,
    /// Remotes whose commands count as manual light changes.
    #[serde(default)]
    pub dimmer_ieees: Vec<String>,
    /// Conditional scenes.
    #[serde(default)]
    pub states: Vec<SceneStateConfig>,
    /// Seconds between motion and the scene turning on.
    #[serde(default)]
    pub on_delay: f64,
    /// Seconds between the end of motion and the lights turning off.
    #[serde(default)]
    pub off_delay: f64,
    /// Seconds after a manual off during which motion is ignored.
    #[serde(default = "default_off_override_time")]
    pub off_override_time: f64,
    /// How a manual off suppresses motion.
    #[serde(default)]
    pub debounce: DebouncePolicy,
}

fn default_off_override_time() -> f64 {
    DEFAULT_OFF_OVERRIDE_SECS
}

impl MotionLightConfig {
    /// Creates a motion light with only a default scene.
    #[must_use]
    pub fn new(name: impl Into<String>, default_scene: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_state: DefaultSceneConfig {
                scene: default_scene.into(),
            },
            light_on_entities: Vec::new(),
            light_off_entities: Vec::new(),
            motion_entities: Vec::new(),
            switch_entities: Vec::new(),
            dimmer_ieees: Vec::new(),
            states: Vec::new(),
            on_delay: 0.0,
            off_delay: 0.0,
            off_override_time: DEFAULT_OFF_OVERRIDE_SECS,
            debounce: DebouncePolicy::default(),
        }
    }

    /// Returns the on delay.
    #[must_use]
    pub fn on_delay(&self) -> Duration {
        seconds(self.on_delay)
    }

    /// Returns the off delay.
    #[must_use]
    pub fn off_delay(&self) -> Duration {
        seconds(self.off_delay)
    }

    /// Returns the manual-off override window.
    #[must_use]
    pub fn off_override_time(&self) -> Duration {
        seconds(self.off_override_time)
    }

    /// Returns the lights turned off after motion.
    #[must_use]
    pub fn lights_to_turn_off(&self) -> &[String] {
        if self.light_off_entities.is_empty() {
            &self.light_on_entities
        } else {
            &self.light_off_entities
        }
    }

    pub(crate) fn validate(&self, key: &str) -> Result<(), ConfigError> {
        check_seconds(format!("{key}.on_delay"), self.on_delay)?;
        check_seconds(format!("{key}.off_delay"), self.off_delay)?;
        check_seconds(format!("{key}.off_override_time"), self.off_override_time)?;

        for (i, state) in self.states.iter().enumerate() {
            let key = format!("{key}.states[{i}]");
            match (&state.elevation_state, &state.time_state) {
                (Some(_), None) => {}
                (None, Some(window)) => {
                    window
                        .bounds()
                        .map_err(|e| invalid(format!("{key}.time_state"), &e))?;
                }
                (None, None) => {
                    return Err(ConfigError::Invalid {
                        key,
                        reason: "either elevation_state or time_state must be set".to_string(),
                    });
                }
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Invalid {
                        key,
                        reason: "only one of elevation_state or time_state can be set"
                            .to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Turns a replacement light on when a light is switched off and all
/// conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightReplacementConfig {
    /// Watched light.
    pub light_entity: String,
    /// Light turned on instead.
    pub light_replacement_entity: String,
    /// Conditions that must all hold.
    #[serde(default)]
    pub conditions: Vec<StateCondition>,
}

/// An entity expected in a given state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCondition {
    /// Entity id.
    pub entity: String,
    /// Expected state.
    pub state: String,
}

// ============================================================================
// Notifications
// ============================================================================

/// Sends notifications when a sensor reaches a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorNotifyConfig {
    /// Watched sensor.
    pub sensor_entity: String,
    /// State that triggers the notifications.
    pub notify_on_state: String,
    /// Notification body.
    pub notification_message: String,
    /// Notification title.
    pub notification_title: String,
    /// Recipients.
    #[serde(rename = "notifications", alias = "notification_configs", default)]
    pub notifications: Vec<NotificationConfig>,
}

/// A one-shot notification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Service in the `notify` domain.
    pub notification_service: String,
    /// Arming switch; turned off after the notification is sent.
    pub switch_entity: String,
}

// ============================================================================
// Tibber
// ============================================================================

/// Price-driven light colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TibberConfig {
    /// API access token.
    pub token: String,
    /// Home whose price is used.
    pub home_id: String,
    /// Color shown for each price level.
    #[serde(default)]
    pub level_to_color: BTreeMap<PriceLevel, RgbColor>,
    /// Lights that show the color.
    #[serde(default)]
    pub light_entities: Vec<String>,
    /// Seconds between price updates.
    #[serde(default = "default_tibber_update_interval")]
    pub update_interval: u64,
    /// GraphQL endpoint.
    #[serde(default = "default_tibber_api_url")]
    pub api_url: String,
}

fn default_tibber_update_interval() -> u64 {
    DEFAULT_TIBBER_UPDATE_INTERVAL
}

fn default_tibber_api_url() -> String {
    DEFAULT_TIBBER_API_URL.to_string()
}

impl TibberConfig {
    /// Creates a configuration with default interval and endpoint.
    #[must_use]
    pub fn new(token: impl Into<String>, home_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            home_id: home_id.into(),
            level_to_color: BTreeMap::new(),
            light_entities: Vec::new(),
            update_interval: DEFAULT_TIBBER_UPDATE_INTERVAL,
            api_url: default_tibber_api_url(),
        }
    }

    /// Returns the update interval.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub(crate) fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.update_interval == 0 {
            return Err(ConfigError::Invalid {
                key: format!("{key}.update_interval"),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Periodic toggle of a dummy switch proving the hub round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Whether the heartbeat runs.
    pub enabled: bool,
    /// Switch that is toggled.
    pub switch_entity: String,
    /// Seconds between toggles.
    pub interval: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            switch_entity: DEFAULT_HEARTBEAT_SWITCH.to_string(),
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl HeartbeatConfig {
    /// Returns the toggle interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub(crate) fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.enabled && self.interval == 0 {
            return Err(ConfigError::Invalid {
                key: format!("{key}.interval"),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}
