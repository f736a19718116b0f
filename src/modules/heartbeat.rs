// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub round-trip heartbeat.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::HeartbeatConfig;
use crate::error::Result;
use crate::router::ModuleRegistration;

/// Toggles a dummy switch periodically and records every state change it
/// sees for that switch.
///
/// As long as the hub accepts the toggle and the event stream delivers the
/// resulting change, `last_state_changed` of the status endpoint keeps
/// moving. A stale value means the round trip is broken.
#[derive(Debug)]
pub struct Heartbeat {
    context: Arc<ModuleContext>,
    config: HeartbeatConfig,
}

impl Heartbeat {
    /// Creates the module, registers it for the switch and schedules the
    /// toggle.
    ///
    /// # Errors
    ///
    /// Returns a value error if the interval is below one second.
    pub fn install(host: &ModuleHost, config: HeartbeatConfig) -> Result<Arc<Self>> {
        let switch = config.switch_entity.clone();
        let interval = config.interval();
        let module = Arc::new(Self {
            context: Arc::clone(host.context()),
            config,
        });

        let task = Arc::clone(&module);
        host.clock().schedule("heartbeat toggle", interval, move || {
            let heartbeat = Arc::clone(&task);
            async move { heartbeat.toggle().await }
        })?;

        let mut registration = ModuleRegistration::new(module);
        registration.on_state_changed(switch, |heartbeat, _event, _old, _new| async move {
            heartbeat.context.status().touch_state_changed();
            Ok(())
        });
        Ok(host.install(registration))
    }

    async fn toggle(&self) -> Result<()> {
        let call =
            ServiceCall::new("switch", "toggle").target_entity(self.config.switch_entity.as_str());
        self.context.client().call_service(call).await
    }
}

#[async_trait]
impl ClockListener for Heartbeat {}

#[async_trait]
impl Module for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::event::Snapshot;
    use crate::modules::testing::Harness;

    #[tokio::test]
    async fn toggles_every_interval() {
        let harness = Harness::new().await;
        harness.given([("switch.home_automations_dummy", "off")]);
        Heartbeat::install(&harness.host, HeartbeatConfig::default()).unwrap();

        for handle in harness.clock.tick() {
            handle.await.unwrap();
        }
        assert!(harness.hub.calls().is_empty());

        harness.time.advance(Duration::from_secs(5));
        for handle in harness.clock.tick() {
            handle.await.unwrap();
        }
        assert_eq!(harness.hub.calls_to("switch", "toggle").len(), 1);
        assert!(harness.hub.state("switch.home_automations_dummy").unwrap().is_on());
    }

    #[tokio::test]
    async fn switch_change_touches_status() {
        let harness = Harness::new().await;
        harness.given([("switch.home_automations_dummy", "off")]);
        Heartbeat::install(&harness.host, HeartbeatConfig::default()).unwrap();
        let status = Arc::clone(harness.host.context().status());
        let before = status.last_state_changed();

        harness.time.advance(Duration::from_secs(42));
        harness
            .change(Snapshot::new("switch.home_automations_dummy", "on"))
            .await;

        let elapsed = status.last_state_changed() - before;
        assert_eq!(elapsed.num_seconds(), 42);
    }

    #[tokio::test]
    async fn rejects_sub_second_interval() {
        let harness = Harness::new().await;
        let config = HeartbeatConfig {
            interval: 0,
            ..HeartbeatConfig::default()
        };
        assert!(Heartbeat::install(&harness.host, config).is_err());
    }
}
