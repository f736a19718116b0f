// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Motion-activated lights.
//!
//! Motion turns on the scene that fits the time of day after `on_delay`;
//! the end of motion turns the lights off after `off_delay`. A person
//! touching the lights takes precedence:
//!
//! - a light changed by a person after the last motion keeps the lights
//!   from being turned off automatically
//! - a light turned off by a person, with the debounce policy
//!   `override_window`, ignores motion for `off_override_time`, measured
//!   from the moment the room is empty

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use parking_lot::Mutex;

use super::{Module, ModuleContext, ModuleHost, PendingAction, resolve_scene};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::{DebouncePolicy, MotionLightConfig};
use crate::error::Result;
use crate::event::Snapshot;
use crate::router::ModuleRegistration;

/// Remote commands that do not mean a person pressed a button.
const PASSIVE_COMMANDS: [&str; 3] = ["", "attribute_updated", "checkin"];

/// Light attributes whose change counts as a manual adjustment.
const TRACKED_ATTRIBUTES: [&str; 3] = ["brightness", "color_temp", "rgb_color"];

#[derive(Debug, Clone, Copy)]
struct Activity {
    last_motion: DateTime<Tz>,
    last_changed: DateTime<Tz>,
    manual_off_time: DateTime<Tz>,
    is_manual_off: bool,
}

/// Motion-activated scene with manual override.
#[derive(Debug)]
pub struct MotionLight {
    name: String,
    context: Arc<ModuleContext>,
    config: MotionLightConfig,
    activity: Mutex<Activity>,
    pending: PendingAction,
}

impl MotionLight {
    /// Creates the module and registers it for the motion sensors, the
    /// lights and the remotes.
    pub fn install(host: &ModuleHost, config: MotionLightConfig) -> Arc<Self> {
        let context = Arc::clone(host.context());
        let now = context.now();
        let long_ago = now - TimeDelta::days(1);
        let module = Arc::new(Self {
            name: format!("motion_light:{}", config.name),
            context,
            config,
            activity: Mutex::new(Activity {
                last_motion: now,
                last_changed: long_ago,
                manual_off_time: long_ago,
                is_manual_off: false,
            }),
            pending: PendingAction::new(),
        });

        let mut registration = ModuleRegistration::new(Arc::clone(&module));
        for motion in &module.config.motion_entities {
            registration.on_state_changed(motion.as_str(), |light, _event, old, new| async move {
                light.on_motion_changed(&old, &new).await
            });
        }
        for lamp in &module.config.light_on_entities {
            registration.on_state_changed(lamp.as_str(), |light, _event, old, new| async move {
                light.on_light_changed(&old, &new).await
            });
        }
        for remote in &module.config.dimmer_ieees {
            registration.on_device_event(remote.as_str(), |light, event, _device| async move {
                light.on_remote_command(event.command()).await
            });
        }
        host.install(registration)
    }

    /// Returns `true` while a delayed scene or off action is waiting.
    #[must_use]
    pub fn has_pending_action(&self) -> bool {
        self.pending.is_pending()
    }

    async fn on_motion_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        if !self.is_enabled().await? || old.state() == new.state() {
            return Ok(());
        }
        tracing::debug!(
            module = %self.name,
            from = old.state(),
            to = new.state(),
            "Motion changed"
        );
        if new.is_on() {
            self.on_motion_on().await
        } else {
            self.on_motion_off().await
        }
    }

    async fn on_motion_on(&self) -> Result<()> {
        if self.pending.cancel() {
            tracing::debug!(module = %self.name, "Cancelled pending off");
        }

        let now = self.context.now();
        if self.config.debounce == DebouncePolicy::OverrideWindow {
            let mut activity = self.activity.lock();
            let since_manual_off = (now - activity.manual_off_time).to_std().unwrap_or_default();
            if since_manual_off < self.config.off_override_time() {
                tracing::debug!(module = %self.name, "Manual off override, not turning on");
                activity.is_manual_off = true;
                return Ok(());
            }
        }

        if !self.all_lights_off().await? {
            tracing::debug!(module = %self.name, "Lights already on");
            return Ok(());
        }

        let scene = resolve_scene(
            self.context.client(),
            &self.config,
            self.context.time_of_day(),
        )
        .await?;
        tracing::debug!(module = %self.name, %scene, "Turning on scene");

        let client = Arc::clone(self.context.client());
        self.pending.schedule(
            self.context.supervisor(),
            format!("{} scene", self.name),
            self.config.on_delay(),
            async move {
                client
                    .call_service(ServiceCall::new("scene", "turn_on").target_entity(scene))
                    .await
            },
        );
        self.activity.lock().last_motion = now;
        Ok(())
    }

    async fn on_motion_off(&self) -> Result<()> {
        if self.pending.cancel() {
            tracing::debug!(module = %self.name, "Cancelled pending scene");
        }

        {
            let mut activity = self.activity.lock();
            if activity.is_manual_off {
                activity.is_manual_off = false;
                activity.manual_off_time = self.context.now();
            }
        }

        if self.any_motion(true).await? {
            return Ok(());
        }

        let changed_by_user = {
            let activity = self.activity.lock();
            activity.last_changed > activity.last_motion
        };
        if changed_by_user {
            tracing::debug!(module = %self.name, "Light changed by user, not turning off");
            return Ok(());
        }

        let client = Arc::clone(self.context.client());
        let lights = self.config.lights_to_turn_off().to_vec();
        self.pending.schedule(
            self.context.supervisor(),
            format!("{} off", self.name),
            self.config.off_delay(),
            async move {
                for light in lights {
                    client
                        .call_service(ServiceCall::new("light", "turn_off").target_entity(light))
                        .await?;
                }
                Ok(())
            },
        );
        Ok(())
    }

    async fn on_light_changed(&self, old: &Snapshot, new: &Snapshot) -> Result<()> {
        let state_changed = old.state() != new.state();
        let adjusted = TRACKED_ATTRIBUTES
            .iter()
            .any(|key| old.attribute(key) != new.attribute(key));
        if !state_changed && !adjusted {
            return Ok(());
        }
        if !self.context.is_manual_change(new.user_id()) {
            return Ok(());
        }

        tracing::debug!(
            module = %self.name,
            light = new.entity_id(),
            from = old.state(),
            to = new.state(),
            "Light changed by user"
        );
        if state_changed && new.is_off() {
            self.on_user_off().await?;
        }
        self.on_user_changed();
        Ok(())
    }

    async fn on_remote_command(&self, command: Option<&str>) -> Result<()> {
        let Some(command) = command else {
            return Ok(());
        };
        if !PASSIVE_COMMANDS.contains(&command) {
            self.on_user_changed();
        }
        if command == "off" {
            self.on_user_off().await?;
        }
        Ok(())
    }

    fn on_user_changed(&self) {
        self.activity.lock().last_changed = self.context.now();
    }

    async fn on_user_off(&self) -> Result<()> {
        self.activity.lock().is_manual_off = true;
        if self.any_motion(false).await? {
            let mut activity = self.activity.lock();
            activity.is_manual_off = false;
            activity.manual_off_time = self.context.now();
        }
        Ok(())
    }

    /// Returns `true` if any motion sensor reports `on` (or `off` when
    /// `detected` is false).
    async fn any_motion(&self, detected: bool) -> Result<bool> {
        let expected = if detected { "on" } else { "off" };
        for sensor in &self.config.motion_entities {
            let state = self.context.client().get_state(sensor).await?;
            if state.state() == expected {
                return Ok(true);
            }
            if !state.is_on() && !state.is_off() {
                tracing::warn!(module = %self.name, sensor = %sensor, state = state.state(), "Unknown motion state");
            }
        }
        Ok(false)
    }

    async fn is_enabled(&self) -> Result<bool> {
        for switch in &self.config.switch_entities {
            let state = self.context.client().get_state(switch).await?;
            if state.is_off() {
                return Ok(false);
            }
            if !state.is_on() {
                tracing::warn!(module = %self.name, switch = %switch, state = state.state(), "Unknown switch state");
            }
        }
        Ok(true)
    }

    async fn all_lights_off(&self) -> Result<bool> {
        for light in &self.config.light_on_entities {
            if !self.context.client().get_state(light).await?.is_off() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl ClockListener for MotionLight {}

#[async_trait]
impl Module for MotionLight {
    fn name(&self) -> &str {
        &self.name
    }
}
