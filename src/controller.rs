// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The composition root.
//!
//! [`Controller`] builds the client, the supervisor, the clock, the router
//! and every configured module, and keeps the event subscription and the
//! clock loop running across reconnections.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::client::{ConnectionState, HubClient};
use crate::clock::{Clock, DEFAULT_TICK_PERIOD, TimeSource, WallTime};
use crate::config::ConfigStore;
use crate::error::Result;
use crate::modules::{ModuleContext, ModuleHost};
use crate::router::EventRouter;
use crate::status::StatusTracker;
use crate::supervisor::Supervisor;
use crate::transport::{HubTransport, WebSocketConfig, WebSocketTransport};

/// Runs the automation modules against one hub.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use home_automations::config::ConfigStore;
/// use home_automations::controller::Controller;
///
/// # async fn example() -> home_automations::Result<()> {
/// let config = Arc::new(ConfigStore::open("config.yml")?);
/// Controller::new(config)?.run().await
/// # }
/// ```
#[derive(Debug)]
pub struct Controller {
    config: Arc<ConfigStore>,
    client: Arc<HubClient>,
    supervisor: Arc<Supervisor>,
    clock: Arc<Clock>,
    router: Arc<EventRouter>,
    status: Arc<StatusTracker>,
    host: ModuleHost,
}

impl Controller {
    /// Creates a controller talking to the configured hub over the
    /// websocket API, on the wall clock of the configured timezone.
    ///
    /// # Errors
    ///
    /// Returns error if the timezone is unknown or a module cannot be
    /// installed.
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        let (hub, zone) = config.read(|c| (c.homeassistant.clone(), c.zone()));
        let transport = WebSocketTransport::new(WebSocketConfig::new(hub.url, hub.token));
        Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(WallTime::new(zone?)),
            DEFAULT_TICK_PERIOD,
        )
    }

    /// Creates a controller from explicit parts.
    ///
    /// Modules are installed immediately; nothing runs until the client
    /// connects.
    ///
    /// # Errors
    ///
    /// Returns error if a module cannot be installed.
    pub fn with_parts(
        config: Arc<ConfigStore>,
        transport: Arc<dyn HubTransport>,
        time: Arc<dyn TimeSource>,
        tick_period: Duration,
    ) -> Result<Self> {
        let client = Arc::new(HubClient::new(transport));
        let supervisor = Supervisor::new(Arc::clone(&client));
        let clock = Arc::new(Clock::new(Arc::clone(&time), Arc::clone(&supervisor)));
        let router = Arc::new(EventRouter::new(Arc::clone(&supervisor)));
        let status = Arc::new(StatusTracker::new(Arc::clone(&time)));
        let context = Arc::new(ModuleContext::new(
            Arc::clone(&supervisor),
            time,
            Arc::clone(&config),
            Arc::clone(&status),
        ));
        let host = ModuleHost::new(context, Arc::clone(&router), Arc::clone(&clock));

        let installed = host.install_all(&config.snapshot())?;
        tracing::info!(modules = installed, "Modules installed");

        register_connected_hook(&supervisor, &router, &clock, tick_period);

        Ok(Self {
            config,
            client,
            supervisor,
            clock,
            router,
            status,
            host,
        })
    }

    /// Returns the configuration store.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
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

    /// Returns the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Returns the event router.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Returns the liveness tracker.
    #[must_use]
    pub fn status(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    /// Returns the module host, for installing additional modules.
    #[must_use]
    pub fn host(&self) -> &ModuleHost {
        &self.host
    }

    /// Connects to the hub. The on-connected hook then starts the event
    /// subscription and the clock loop.
    ///
    /// Retries transient failures until connected; returns
    /// [`ConnectionState::AuthFailed`] if the credentials are rejected.
    pub async fn start(&self) -> ConnectionState {
        self.client.connect().await
    }

    /// Stops the connection-dependent tasks and closes the connection.
    pub async fn shutdown(&self) {
        self.supervisor.stop_dependents();
        self.client.mark_disconnected().await;
        tracing::info!("Controller stopped");
    }

    /// Runs until ctrl-c.
    ///
    /// The status API (feature `api`) is served alongside. An authentication
    /// failure stops reconnecting but keeps the process and the status API
    /// alive, so the stale timestamps are visible.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; failures of supervised work are
    /// handled by the supervisor.
    pub async fn run(self) -> Result<()> {
        #[cfg(feature = "api")]
        let api = self.spawn_status_api();

        let client = Arc::clone(&self.client);
        let connect = tokio::spawn(async move {
            let state = client.connect().await;
            if state == ConnectionState::AuthFailed {
                tracing::error!("Not connected: the hub rejected the access token");
            }
        });

        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Cannot listen for ctrl-c, stopping");
        }
        tracing::info!("Shutting down");

        connect.abort();
        #[cfg(feature = "api")]
        api.abort();
        self.shutdown().await;
        Ok(())
    }

    #[cfg(feature = "api")]
    fn spawn_status_api(&self) -> tokio::task::JoinHandle<()> {
        let addr = self.config.read(|c| c.api.socket_addr());
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            match addr {
                Ok(addr) => {
                    if let Err(err) = crate::status::serve(addr, status).await {
                        tracing::error!(error = %err, "Status API stopped");
                    }
                }
                Err(err) => tracing::error!(error = %err, "Status API disabled"),
            }
        })
    }
}

/// Registers the hook that (re)starts the event subscription and the clock
/// loop after every successful connection.
///
/// The hook holds weak references so the client does not keep the rest of
/// the controller alive.
fn register_connected_hook(
    supervisor: &Arc<Supervisor>,
    router: &Arc<EventRouter>,
    clock: &Arc<Clock>,
    tick_period: Duration,
) {
    let supervisor_ref = Arc::downgrade(supervisor);
    let router = Arc::downgrade(router);
    let clock = Arc::downgrade(clock);
    supervisor.client().on_connected(Arc::new(move || {
        start_dependents(&supervisor_ref, &router, &clock, tick_period);
    }));
}

fn start_dependents(
    supervisor: &Weak<Supervisor>,
    router: &Weak<EventRouter>,
    clock: &Weak<Clock>,
    tick_period: Duration,
) {
    let (Some(supervisor), Some(router), Some(clock)) =
        (supervisor.upgrade(), router.upgrade(), clock.upgrade())
    else {
        return;
    };

    let client = Arc::clone(supervisor.client());
    let dispatcher = Arc::clone(&supervisor);
    supervisor.spawn_dependent("event subscription", async move {
        client
            .subscribe_events(move |event| {
                let router = Arc::clone(&router);
                dispatcher.spawn("dispatch", async move {
                    router.dispatch(Arc::new(event)).await;
                    Ok(())
                });
            })
            .await
    });

    supervisor.spawn_dependent("clock", async move { clock.run(tick_period).await });
    tracing::debug!("Started event subscription and clock loop");
}
