// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote controls.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::DimmerConfig;
use crate::error::Result;
use crate::router::ModuleRegistration;

/// Turns lights on at full brightness when a remote sends `on`.
///
/// Other commands (`off`, `press`, `hold`, `release`) are accepted and
/// ignored.
#[derive(Debug)]
pub struct Dimmer {
    name: String,
    context: Arc<ModuleContext>,
    config: DimmerConfig,
}

impl Dimmer {
    /// Creates the module and registers it for the remote's events.
    pub fn install(host: &ModuleHost, config: DimmerConfig) -> Arc<Self> {
        let device = config.device_ieee.clone();
        let module = Arc::new(Self {
            name: format!("dimmer:{device}"),
            context: Arc::clone(host.context()),
            config,
        });

        let mut registration = ModuleRegistration::new(module);
        registration.on_device_event(device, |dimmer, event, _device| async move {
            dimmer.on_command(event.command()).await
        });
        host.install(registration)
    }

    async fn on_command(&self, command: Option<&str>) -> Result<()> {
        match command {
            Some("on") => {
                for light in &self.config.light_entities {
                    let call = ServiceCall::new("light", "turn_on")
                        .with_data("brightness_pct", 100)
                        .target_entity(light.as_str());
                    self.context.client().call_service(call).await?;
                }
                Ok(())
            }
            Some("off" | "press" | "hold" | "release") | None => Ok(()),
            Some(other) => {
                tracing::debug!(module = %self.name, command = other, "Ignoring remote command");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ClockListener for Dimmer {}

#[async_trait]
impl Module for Dimmer {
    fn name(&self) -> &str {
        &self.name
    }
}
