// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Window-aware heating.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::{ClimateConfig, ThermostatConfig};
use crate::error::Result;
use crate::event::Snapshot;
use crate::router::ModuleRegistration;

/// Distance from the schedule within which the scheduled value is used
/// directly, in °C.
pub const SCHEDULE_TOLERANCE: f64 = 0.25;

/// Cooldown between identical `set_temperature` calls.
pub const SET_TEMPERATURE_COOLDOWN: Duration = Duration::from_secs(120);

const CLIMATE_UNAVAILABLE: &str = "unavailable";
const SETPOINT_EPSILON: f64 = 0.01;

/// Drives one thermostat of a climate zone.
///
/// While any window is open the thermostat is off. Otherwise it heats
/// towards the zone schedule: far from the scheduled value it is driven to
/// the zone's effective maximum or minimum so the valve opens or closes
/// fully, and close to it the scheduled value itself is set. Any enable
/// switch that is off pauses the module. A setpoint changed by a person is
/// written back into the schedule slot that is currently active.
#[derive(Debug)]
pub struct Thermostat {
    name: String,
    context: Arc<ModuleContext>,
    zone: usize,
    climate: ClimateConfig,
    config: ThermostatConfig,
}

impl Thermostat {
    /// Creates the module for thermostat `config` of climate zone `zone`
    /// and registers it for the windows and the climate entity.
    pub fn install(
        host: &ModuleHost,
        zone: usize,
        climate: &ClimateConfig,
        config: ThermostatConfig,
    ) -> Arc<Self> {
        let module = Arc::new(Self {
            name: format!("thermostat:{}", config.climate_entity),
            context: Arc::clone(host.context()),
            zone,
            climate: climate.clone(),
            config,
        });

        let mut registration = ModuleRegistration::new(Arc::clone(&module));
        for window in &module.config.window_entities {
            registration.on_state_changed(window.as_str(), |thermostat, _event, _old, _new| {
                async move { thermostat.apply_state().await }
            });
        }
        registration.on_state_changed(
            module.config.climate_entity.as_str(),
            |thermostat, _event, old, new| async move {
                thermostat.on_climate_changed(&old, &new).await
            },
        );
        host.install(registration)
    }

    /// Returns the setpoint for a scheduled and a measured temperature.
    #[must_use]
    pub fn target_temperature(&self, scheduled: f64, current: f64) -> f64 {
        let target = if (scheduled - current).abs() <= SCHEDULE_TOLERANCE {
            scheduled
        } else if scheduled > current {
            self.climate.max_effective_thermostat_temp
        } else {
            self.climate.min_effective_thermostat_temp
        };
        self.climate.clamp(target)
    }

    /// Turns the thermostat off while a window is open and back on, with
    /// the current target, once all windows are closed.
    async fn apply_state(&self) -> Result<()> {
        if self.is_switch_off().await? {
            return Ok(());
        }

        let client = self.context.client();
        let entity = self.config.climate_entity.as_str();
        if self.is_window_open().await? {
            tracing::info!(module = %self.name, "Window open, turning off");
            return client
                .call_service(ServiceCall::new("climate", "turn_off").target_entity(entity))
                .await;
        }

        tracing::info!(module = %self.name, "Windows closed, turning on");
        client
            .call_service(ServiceCall::new("climate", "turn_on").target_entity(entity))
            .await?;
        self.apply_target_temperature().await
    }

    async fn apply_target_temperature(&self) -> Result<()> {
        if self.is_switch_off().await? || self.is_window_open().await? {
            return Ok(());
        }

        let client = self.context.client();
        let climate = client.get_state(&self.config.climate_entity).await?;
        if climate.state() == CLIMATE_UNAVAILABLE {
            return Ok(());
        }

        let Some(current) = self.current_temperature(&climate).await? else {
            tracing::debug!(module = %self.name, "No temperature reading");
            return Ok(());
        };
        let scheduled = self
            .context
            .config()
            .scheduled_temperature(self.zone, self.context.time_of_day())?;
        let target = self.target_temperature(scheduled, current);

        if climate
            .attribute_f64("temperature")
            .is_some_and(|setpoint| (setpoint - target).abs() < SETPOINT_EPSILON)
        {
            return Ok(());
        }

        client
            .call_service(
                ServiceCall::new("climate", "set_temperature")
                    .with_data("temperature", target)
                    .target_entity(self.config.climate_entity.as_str())
                    .with_cooldown(SET_TEMPERATURE_COOLDOWN),
            )
            .await?;
        tracing::info!(module = %self.name, target, scheduled, current, "Set temperature");
        Ok(())
    }

    async fn on_climate_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        let (Some(before), Some(after)) = (
            old.attribute_f64("temperature"),
            new.attribute_f64("temperature"),
        ) else {
            return Ok(());
        };
        if (before - after).abs() < SETPOINT_EPSILON
            || !self.context.is_manual_change(new.user_id())
        {
            return Ok(());
        }

        tracing::info!(module = %self.name, temperature = after, "Manual setpoint, updating schedule");
        self.context
            .config()
            .update_schedule(self.zone, self.context.time_of_day(), after)
            .await?;
        Ok(())
    }

    async fn current_temperature(&self, climate: &Snapshot) -> Result<Option<f64>> {
        match &self.config.temperature_entity {
            Some(sensor) => Ok(self.context.client().get_state(sensor).await?.state_f64()),
            None => Ok(climate.attribute_f64("current_temperature")),
        }
    }

    async fn is_window_open(&self) -> Result<bool> {
        for window in &self.config.window_entities {
            if self.context.client().get_state(window).await?.is_on() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn is_switch_off(&self) -> Result<bool> {
        for switch in &self.config.switch_entities {
            if self.context.client().get_state(switch).await?.is_off() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl ClockListener for Thermostat {
    async fn on_second_changed(&self, _second: u32) -> Result<()> {
        self.apply_target_temperature().await
    }
}

#[async_trait]
impl Module for Thermostat {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::modules::testing::{AUTOMATION_USER, Harness, PERSON};
    use crate::types::Schedule;

    const CLIMATE: &str = "climate.office";
    const WINDOW: &str = "binary_sensor.office_window";
    const SWITCH: &str = "input_boolean.office_heating";

    fn zone() -> ClimateConfig {
        ClimateConfig::new(Schedule::from_iter([("06:00", 21.0), ("22:00", 17.0)])).with_thermostat(
            ThermostatConfig::new(CLIMATE)
                .with_window(WINDOW)
                .with_switch(SWITCH),
        )
    }

    fn climate(state: &str, setpoint: f64, current: f64) -> Snapshot {
        Snapshot::new(CLIMATE, state)
            .with_attribute("temperature", setpoint)
            .with_attribute("current_temperature", current)
    }

    async fn setup() -> (Harness, Arc<Thermostat>) {
        let mut config = Config::default();
        config.climate.push(zone());
        let harness = Harness::with_config(config).await;
        harness.given([(WINDOW, "off"), (SWITCH, "on")]);
        harness.hub.set_state(climate("heat", 20.0, 20.0));

        let climate = zone();
        let thermostat =
            Thermostat::install(&harness.host, 0, &climate, climate.thermostats[0].clone());
        (harness, thermostat)
    }

    fn setpoints(harness: &Harness) -> Vec<f64> {
        harness
            .hub
            .calls_to("climate", "set_temperature")
            .iter()
            .filter_map(|c| c.data()?.get("temperature")?.as_f64())
            .collect()
    }

    #[tokio::test]
    async fn target_follows_distance_to_schedule() {
        let (_harness, thermostat) = setup().await;

        assert!((thermostat.target_temperature(21.0, 20.8) - 21.0).abs() < f64::EPSILON);
        assert!((thermostat.target_temperature(21.0, 19.0) - 29.0).abs() < f64::EPSILON);
        assert!((thermostat.target_temperature(21.0, 23.0) - 17.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn target_is_clamped_to_thermostat_range() {
        let mut config = Config::default();
        let mut climate = zone();
        climate.max_effective_thermostat_temp = 35.0;
        config.climate.push(climate.clone());
        let harness = Harness::with_config(config).await;
        let thermostat =
            Thermostat::install(&harness.host, 0, &climate, climate.thermostats[0].clone());

        assert!((thermostat.target_temperature(21.0, 15.0) - 29.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn sets_scheduled_temperature_once_per_cooldown() {
        let (harness, thermostat) = setup().await;
        harness.hub.set_state(climate("heat", 20.0, 20.9));

        thermostat.on_second_changed(1).await.unwrap();
        assert_eq!(setpoints(&harness), vec![21.0]);

        // The valve did not take the setpoint yet.
        let err = thermostat.on_second_changed(2).await.unwrap_err();
        assert!(matches!(err, Error::ServiceTimeout(_)));

        tokio::time::advance(SET_TEMPERATURE_COOLDOWN + Duration::from_secs(1)).await;
        thermostat.on_second_changed(3).await.unwrap();
        assert_eq!(setpoints(&harness), vec![21.0, 21.0]);
    }

    #[tokio::test]
    async fn reached_setpoint_is_not_sent_again() {
        let (harness, thermostat) = setup().await;
        harness.hub.set_state(climate("heat", 21.0, 21.1));

        thermostat.on_second_changed(1).await.unwrap();
        assert!(setpoints(&harness).is_empty());
    }

    #[tokio::test]
    async fn paused_by_switch_or_unavailable() {
        let (harness, thermostat) = setup().await;
        harness.hub.set_state(climate("heat", 20.0, 18.0));

        harness.given([(SWITCH, "off")]);
        thermostat.on_second_changed(1).await.unwrap();

        harness.given([(SWITCH, "on")]);
        harness.hub.set_state(climate(CLIMATE_UNAVAILABLE, 20.0, 18.0));
        thermostat.on_second_changed(2).await.unwrap();

        assert!(harness.hub.calls().is_empty());
    }

    #[tokio::test]
    async fn window_turns_heating_off_and_on() {
        let (harness, _thermostat) = setup().await;
        harness.hub.set_state(climate("heat", 20.0, 18.0));

        harness.change(Snapshot::new(WINDOW, "on")).await;
        assert_eq!(harness.hub.calls_to("climate", "turn_off").len(), 1);
        assert!(setpoints(&harness).is_empty());

        harness.hub.set_state(climate("off", 20.0, 18.0));
        harness.change(Snapshot::new(WINDOW, "off")).await;
        assert_eq!(harness.hub.calls_to("climate", "turn_on").len(), 1);
        assert_eq!(setpoints(&harness), vec![29.0]);
    }

    #[tokio::test]
    async fn manual_setpoint_updates_active_slot() {
        let (harness, _thermostat) = setup().await;

        harness
            .change(climate("heat", 22.5, 20.0).with_user_id(PERSON))
            .await;

        let store = harness.host.context().config();
        assert_eq!(
            store.read(|c| c.climate[0].schedule.get("06:00").copied()),
            Some(22.5)
        );
    }

    #[tokio::test]
    async fn own_setpoint_changes_are_not_overrides() {
        let (harness, _thermostat) = setup().await;

        harness
            .change(climate("heat", 29.0, 20.0).with_user_id(AUTOMATION_USER))
            .await;
        harness.change(climate("heat", 25.0, 20.0)).await;

        let store = harness.host.context().config();
        assert_eq!(
            store.read(|c| c.climate[0].schedule.get("06:00").copied()),
            Some(21.0)
        );
    }
}
