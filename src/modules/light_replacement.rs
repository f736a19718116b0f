// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fallback lights.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::LightReplacementConfig;
use crate::error::Result;
use crate::event::Snapshot;
use crate::router::ModuleRegistration;

/// Turns a replacement light on when the watched light goes from on to
/// off while every condition holds.
#[derive(Debug)]
pub struct LightReplacement {
    name: String,
    context: Arc<ModuleContext>,
    config: LightReplacementConfig,
}

impl LightReplacement {
    /// Creates the module and registers it for the watched light.
    pub fn install(host: &ModuleHost, config: LightReplacementConfig) -> Arc<Self> {
        let light = config.light_entity.clone();
        let module = Arc::new(Self {
            name: format!("light_replacement:{light}"),
            context: Arc::clone(host.context()),
            config,
        });

        let mut registration = ModuleRegistration::new(module);
        registration.on_state_changed(light, |replacement, _event, old, new| async move {
            replacement.on_light_changed(&old, &new).await
        });
        host.install(registration)
    }

    async fn on_light_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        if !old.is_on() || !new.is_off() {
            return Ok(());
        }

        let client = self.context.client();
        for condition in &self.config.conditions {
            if client.get_state(&condition.entity).await?.state() != condition.state {
                return Ok(());
            }
        }

        tracing::debug!(
            module = %self.name,
            replacement = %self.config.light_replacement_entity,
            "Turning on replacement light"
        );
        let call = ServiceCall::new("light", "turn_on")
            .target_entity(self.config.light_replacement_entity.as_str());
        client.call_service(call).await
    }
}

#[async_trait]
impl ClockListener for LightReplacement {}

#[async_trait]
impl Module for LightReplacement {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateCondition;
    use crate::modules::testing::Harness;

    async fn setup() -> Harness {
        let harness = Harness::new().await;
        harness.given([
            ("light.ceiling", "on"),
            ("light.lamp", "off"),
            ("input_select.mode", "evening"),
        ]);
        LightReplacement::install(
            &harness.host,
            LightReplacementConfig {
                light_entity: "light.ceiling".to_string(),
                light_replacement_entity: "light.lamp".to_string(),
                conditions: vec![StateCondition {
                    entity: "input_select.mode".to_string(),
                    state: "evening".to_string(),
                }],
            },
        );
        harness
    }

    #[tokio::test]
    async fn replaces_light_switched_off() {
        let harness = setup().await;
        harness.change(Snapshot::new("light.ceiling", "off")).await;

        assert_eq!(harness.hub.calls_to("light", "turn_on").len(), 1);
        assert!(harness.hub.state("light.lamp").unwrap().is_on());
    }

    #[tokio::test]
    async fn unmet_condition_blocks_replacement() {
        let harness = setup().await;
        harness.given([("input_select.mode", "night")]);
        harness.change(Snapshot::new("light.ceiling", "off")).await;
        assert!(harness.hub.calls().is_empty());
    }

    #[tokio::test]
    async fn only_on_to_off_triggers() {
        let harness = setup().await;
        harness.given([("light.ceiling", "unavailable")]);
        harness.change(Snapshot::new("light.ceiling", "off")).await;
        harness.change(Snapshot::new("light.ceiling", "on")).await;
        assert!(harness.hub.calls().is_empty());
    }
}
