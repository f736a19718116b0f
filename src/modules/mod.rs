// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule modules.
//!
//! A module is one independent automation rule. It reacts to hub events
//! through the handlers it registers with the
//! [`EventRouter`](crate::router::EventRouter) and to time through the
//! [`ClockListener`] callbacks and scheduled tasks of the
//! [`Clock`]. Modules never talk to the transport directly; every request
//! goes through the shared [`HubClient`] so cooldowns and the error
//! taxonomy apply uniformly.
//!
//! # Modules
//!
//! - [`Thermostat`] - Window-aware heating with schedule overrides
//! - [`MotionLight`] - Motion-activated scenes
//! - [`Dimmer`] - Remote `on` command to full brightness
//! - [`TimedLight`] - Lights following a schedule entity
//! - [`SensorNotify`] - One-shot notifications on a sensor state
//! - [`LightReplacement`] - Fallback light when a light is switched off
//! - [`PriceLight`] - Light color from the electricity price (feature `http`)
//! - [`Heartbeat`] - Periodic toggle proving the hub round trip

mod day_state;
mod dimmer;
mod heartbeat;
mod light_replacement;
mod motion_light;
mod pending;
#[cfg(feature = "http")]
mod price_light;
mod sensor_notify;
mod thermostat;
mod timed_light;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Timelike};
use chrono_tz::Tz;

pub use day_state::resolve_scene;
pub use dimmer::Dimmer;
pub use heartbeat::Heartbeat;
pub use light_replacement::LightReplacement;
pub use motion_light::MotionLight;
pub use pending::PendingAction;
#[cfg(feature = "http")]
pub use price_light::{PriceInfo, PriceLight, TibberClient};
pub use sensor_notify::SensorNotify;
pub use thermostat::Thermostat;
pub use timed_light::TimedLight;

use crate::client::HubClient;
use crate::clock::{Clock, ClockListener, TimeSource};
use crate::config::{Config, ConfigStore};
use crate::error::Result;
use crate::event::Event;
use crate::router::{EventRouter, ModuleRegistration};
use crate::status::StatusTracker;
use crate::supervisor::Supervisor;

/// An automation rule.
#[async_trait]
pub trait Module: ClockListener {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Called for every hub event before any entity or device handler.
    async fn on_event(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Services shared by all modules.
#[derive(Debug)]
pub struct ModuleContext {
    client: Arc<HubClient>,
    supervisor: Arc<Supervisor>,
    time: Arc<dyn TimeSource>,
    config: Arc<ConfigStore>,
    status: Arc<StatusTracker>,
    automation_user: Option<String>,
}

impl ModuleContext {
    /// Creates a context. The automation user is read from
    /// `homeassistant.user_id`.
    #[must_use]
    pub fn new(
        supervisor: Arc<Supervisor>,
        time: Arc<dyn TimeSource>,
        config: Arc<ConfigStore>,
        status: Arc<StatusTracker>,
    ) -> Self {
        let automation_user = config.read(|c| c.homeassistant.user_id.clone());
        Self {
            client: Arc::clone(supervisor.client()),
            supervisor,
            time,
            config,
            status,
            automation_user,
        }
    }

    /// Returns the hub client.
    #[must_use]
    pub fn client(&self) -> &Arc<HubClient> {
        &self.client
    }

    /// Returns the supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Returns the configuration store.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Returns the liveness tracker.
    #[must_use]
    pub fn status(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    /// Returns the current local time.
    #[must_use]
    pub fn now(&self) -> DateTime<Tz> {
        self.time.now()
    }

    /// Returns the current local time of day, truncated to seconds.
    #[must_use]
    pub fn time_of_day(&self) -> NaiveTime {
        let time = self.time.now().time();
        time.with_nanosecond(0).unwrap_or(time)
    }

    /// Returns `true` if `user_id` is the user the controller acts as.
    #[must_use]
    pub fn is_automation_user(&self, user_id: Option<&str>) -> bool {
        user_id.is_some() && user_id == self.automation_user.as_deref()
    }

    /// Returns `true` if the change was made by a person: it carries a user
    /// id and that id is not the automation user.
    #[must_use]
    pub fn is_manual_change(&self, user_id: Option<&str>) -> bool {
        user_id.is_some() && !self.is_automation_user(user_id)
    }
}

/// Wires modules into the router and the clock.
#[derive(Debug, Clone)]
pub struct ModuleHost {
    context: Arc<ModuleContext>,
    router: Arc<EventRouter>,
    clock: Arc<Clock>,
}

impl ModuleHost {
    /// Creates a host.
    #[must_use]
    pub fn new(context: Arc<ModuleContext>, router: Arc<EventRouter>, clock: Arc<Clock>) -> Self {
        Self {
            context,
            router,
            clock,
        }
    }

    /// Returns the shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<ModuleContext> {
        &self.context
    }

    /// Returns the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Registers a module's handlers with the router and the module itself
    /// as a clock listener.
    pub fn install<M: Module + 'static>(&self, registration: ModuleRegistration<M>) -> Arc<M> {
        let module = Arc::clone(registration.module());
        self.clock
            .register(Arc::clone(&module) as Arc<dyn ClockListener>);
        self.router.register(registration);
        tracing::info!(module = module.name(), "Installed module");
        module
    }

    /// Installs every module the configuration describes, in a fixed
    /// order: thermostats, dimmers, timed lights, motion lights, sensor
    /// notifications, light replacements, price lights, heartbeat.
    ///
    /// Returns the number of installed modules.
    ///
    /// # Errors
    ///
    /// Returns an error if a module cannot schedule its periodic task.
    pub fn install_all(&self, config: &Config) -> Result<usize> {
        let mut installed = 0;

        for (zone, climate) in config.climate.iter().enumerate() {
            for thermostat in &climate.thermostats {
                Thermostat::install(self, zone, climate, thermostat.clone());
                installed += 1;
            }
        }
        for dimmer in &config.dimmers {
            Dimmer::install(self, dimmer.clone());
            installed += 1;
        }
        for timed in &config.timed_lights {
            TimedLight::install(self, timed.clone());
            installed += 1;
        }
        for motion in &config.motion_lights {
            MotionLight::install(self, motion.clone());
            installed += 1;
        }
        for notify in &config.sensor_notify {
            SensorNotify::install(self, notify.clone());
            installed += 1;
        }
        for replacement in &config.light_replacements {
            LightReplacement::install(self, replacement.clone());
            installed += 1;
        }
        #[cfg(feature = "http")]
        if let Some(tibber) = &config.tibber {
            PriceLight::install(self, tibber.clone())?;
            installed += 1;
        }
        #[cfg(not(feature = "http"))]
        if config.tibber.is_some() {
            tracing::warn!("Tibber is configured but the http feature is disabled");
        }
        if config.heartbeat.enabled {
            Heartbeat::install(self, config.heartbeat.clone())?;
            installed += 1;
        }

        Ok(installed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the module tests.

    use std::sync::Arc;

    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    use super::{ModuleContext, ModuleHost};
    use crate::client::HubClient;
    use crate::clock::{Clock, ManualTime, TimeSource};
    use crate::config::{Config, ConfigStore};
    use crate::event::{Event, Snapshot};
    use crate::router::EventRouter;
    use crate::status::StatusTracker;
    use crate::supervisor::Supervisor;
    use crate::transport::{HubTransport, MemoryTransport};

    pub const AUTOMATION_USER: &str = "automation";
    pub const PERSON: &str = "person";

    pub struct Harness {
        pub hub: Arc<MemoryTransport>,
        pub time: Arc<ManualTime>,
        pub router: Arc<EventRouter>,
        pub clock: Arc<Clock>,
        pub host: ModuleHost,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_config(Config::default()).await
        }

        pub async fn with_config(mut config: Config) -> Self {
            config.homeassistant.user_id = Some(AUTOMATION_USER.to_string());
            let hub = Arc::new(MemoryTransport::new());
            hub.set_acting_user(Some(AUTOMATION_USER));
            let client = Arc::new(HubClient::new(Arc::clone(&hub) as Arc<dyn HubTransport>));
            client.connect().await;

            let time = Arc::new(ManualTime::new(
                Berlin.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            ));
            let source = Arc::clone(&time) as Arc<dyn TimeSource>;
            let supervisor = Supervisor::new(client);
            let clock = Arc::new(Clock::new(Arc::clone(&source), Arc::clone(&supervisor)));
            let router = Arc::new(EventRouter::new(Arc::clone(&supervisor)));
            let status = Arc::new(StatusTracker::new(Arc::clone(&source)));
            let context = Arc::new(ModuleContext::new(
                supervisor,
                source,
                Arc::new(ConfigStore::in_memory(config)),
                status,
            ));
            let host = ModuleHost::new(context, Arc::clone(&router), Arc::clone(&clock));

            Self {
                hub,
                time,
                router,
                clock,
                host,
            }
        }

        /// Changes an entity and dispatches the resulting event.
        pub async fn change(&self, snapshot: Snapshot) -> usize {
            let old = self.hub.state(snapshot.entity_id());
            self.hub.set_state(snapshot.clone());
            self.router
                .dispatch(Arc::new(Event::state_changed(
                    snapshot.entity_id().to_string(),
                    old,
                    Some(snapshot),
                )))
                .await
        }

        /// Sets the state of a set of entities without dispatching.
        pub fn given<'a>(&self, states: impl IntoIterator<Item = (&'a str, &'a str)>) {
            for (entity_id, state) in states {
                self.hub.set_state(Snapshot::new(entity_id, state));
            }
        }
    }
}
