// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lights following a schedule entity.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::TimedLightConfig;
use crate::error::Result;
use crate::event::Snapshot;
use crate::router::ModuleRegistration;

/// Switches lights when the schedule entity turns on or off, as long as
/// the optional enable switch is on.
#[derive(Debug)]
pub struct TimedLight {
    name: String,
    context: Arc<ModuleContext>,
    config: TimedLightConfig,
}

impl TimedLight {
    /// Creates the module and registers it for the schedule entity.
    pub fn install(host: &ModuleHost, config: TimedLightConfig) -> Arc<Self> {
        let entity = config.schedule_entity.clone();
        let module = Arc::new(Self {
            name: format!("timed_light:{entity}"),
            context: Arc::clone(host.context()),
            config,
        });

        let mut registration = ModuleRegistration::new(module);
        registration.on_state_changed(entity, |timed, _event, old, new| async move {
            timed.on_schedule_changed(&old, &new).await
        });
        host.install(registration)
    }

    async fn on_schedule_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        tracing::info!(
            module = %self.name,
            from = old.state(),
            to = new.state(),
            "Schedule changed"
        );
        if old.state() == new.state() {
            return Ok(());
        }
        let service = match new.state() {
            "on" => "turn_on",
            "off" => "turn_off",
            _ => return Ok(()),
        };
        if !self.is_enabled().await? {
            return Ok(());
        }
        for light in &self.config.light_entities {
            let call = ServiceCall::new("light", service).target_entity(light.as_str());
            self.context.client().call_service(call).await?;
        }
        Ok(())
    }

    async fn is_enabled(&self) -> Result<bool> {
        match &self.config.switch_entity {
            Some(switch) => Ok(self.context.client().get_state(switch).await?.is_on()),
            None => Ok(true),
        }
    }
}

#[async_trait]
impl ClockListener for TimedLight {}

#[async_trait]
impl Module for TimedLight {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::Harness;

    async fn setup(switch: Option<&str>) -> Harness {
        let harness = Harness::new().await;
        harness.given([("schedule.porch", "off"), ("input_boolean.porch", "on")]);
        TimedLight::install(
            &harness.host,
            TimedLightConfig {
                schedule_entity: "schedule.porch".to_string(),
                light_entities: vec!["light.porch".to_string()],
                switch_entity: switch.map(str::to_string),
            },
        );
        harness
    }

    #[tokio::test]
    async fn follows_schedule() {
        let harness = setup(None).await;

        harness.change(Snapshot::new("schedule.porch", "on")).await;
        assert_eq!(harness.hub.calls_to("light", "turn_on").len(), 1);

        harness.change(Snapshot::new("schedule.porch", "off")).await;
        assert_eq!(harness.hub.calls_to("light", "turn_off").len(), 1);
    }

    #[tokio::test]
    async fn unchanged_state_is_ignored() {
        let harness = setup(None).await;
        harness.change(Snapshot::new("schedule.porch", "off")).await;
        assert!(harness.hub.calls().is_empty());
    }

    #[tokio::test]
    async fn disabled_switch_blocks_changes() {
        let harness = setup(Some("input_boolean.porch")).await;
        harness.given([("input_boolean.porch", "off")]);

        harness.change(Snapshot::new("schedule.porch", "on")).await;
        assert!(harness.hub.calls().is_empty());

        harness.given([("input_boolean.porch", "on")]);
        harness.change(Snapshot::new("schedule.porch", "off")).await;
        assert_eq!(harness.hub.calls_to("light", "turn_off").len(), 1);
    }
}
