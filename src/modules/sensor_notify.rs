// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot notifications when a sensor reaches a state.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::SensorNotifyConfig;
use crate::error::Result;
use crate::event::Snapshot;
use crate::router::ModuleRegistration;

/// Notifies every armed recipient when the sensor enters
/// `notify_on_state`, then disarms them.
///
/// A recipient is armed while its switch is on. Turning the switch off
/// after sending makes each notification one-shot until someone re-arms it.
#[derive(Debug)]
pub struct SensorNotify {
    name: String,
    context: Arc<ModuleContext>,
    config: SensorNotifyConfig,
}

impl SensorNotify {
    /// Creates the module and registers it for the sensor.
    pub fn install(host: &ModuleHost, config: SensorNotifyConfig) -> Arc<Self> {
        let sensor = config.sensor_entity.clone();
        let module = Arc::new(Self {
            name: format!("sensor_notify:{sensor}"),
            context: Arc::clone(host.context()),
            config,
        });

        let mut registration = ModuleRegistration::new(module);
        registration.on_state_changed(sensor, |notify, _event, old, new| async move {
            notify.on_sensor_changed(&old, &new).await
        });
        host.install(registration)
    }

    async fn on_sensor_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        if old.state() == new.state() || new.state() != self.config.notify_on_state {
            return Ok(());
        }

        let client = self.context.client();
        for recipient in &self.config.notifications {
            if !client.get_state(&recipient.switch_entity).await?.is_on() {
                continue;
            }
            tracing::info!(
                module = %self.name,
                service = %recipient.notification_service,
                "Sending notification"
            );
            let notify = ServiceCall::new("notify", recipient.notification_service.as_str())
                .with_data("message", self.config.notification_message.as_str())
                .with_data("title", self.config.notification_title.as_str());
            client.call_service(notify).await?;

            let disarm = ServiceCall::new("input_boolean", "turn_off")
                .target_entity(recipient.switch_entity.as_str());
            client.call_service(disarm).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ClockListener for SensorNotify {}

#[async_trait]
impl Module for SensorNotify {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::modules::testing::Harness;

    async fn setup() -> Harness {
        let harness = Harness::new().await;
        harness.given([
            ("sensor.washer", "running"),
            ("input_boolean.notify_alice", "on"),
            ("input_boolean.notify_bob", "off"),
        ]);
        SensorNotify::install(
            &harness.host,
            SensorNotifyConfig {
                sensor_entity: "sensor.washer".to_string(),
                notify_on_state: "done".to_string(),
                notification_message: "Laundry is done".to_string(),
                notification_title: "Washer".to_string(),
                notifications: vec![
                    NotificationConfig {
                        notification_service: "mobile_app_alice".to_string(),
                        switch_entity: "input_boolean.notify_alice".to_string(),
                    },
                    NotificationConfig {
                        notification_service: "mobile_app_bob".to_string(),
                        switch_entity: "input_boolean.notify_bob".to_string(),
                    },
                ],
            },
        );
        harness
    }

    #[tokio::test]
    async fn notifies_armed_recipients_once() {
        let harness = setup().await;

        harness.change(Snapshot::new("sensor.washer", "done")).await;

        let sent = harness.hub.calls_to("notify", "mobile_app_alice");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data().unwrap()["title"], "Washer");
        assert!(harness.hub.calls_to("notify", "mobile_app_bob").is_empty());
        assert!(harness.hub.state("input_boolean.notify_alice").unwrap().is_off());

        harness.change(Snapshot::new("sensor.washer", "running")).await;
        harness.change(Snapshot::new("sensor.washer", "done")).await;
        assert_eq!(harness.hub.calls_to("notify", "mobile_app_alice").len(), 1);
    }

    #[tokio::test]
    async fn other_states_do_not_notify() {
        let harness = setup().await;
        harness.change(Snapshot::new("sensor.washer", "paused")).await;
        assert!(harness.hub.calls().is_empty());
    }
}
