// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared hub client.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{ServiceCall, ServiceFingerprint};
use crate::error::{Error, ProtocolError, Result};
use crate::event::{Event, Snapshot};
use crate::transport::HubTransport;

/// Delay between failed connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Callback run after every successful connection.
pub type ConnectedHook = Arc<dyn Fn() + Send + Sync>;

/// Connection lifecycle of a [`HubClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a connect may be attempted.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected and authenticated.
    Connected,
    /// The hub rejected the credentials. Terminal.
    AuthFailed,
}

/// Connection manager shared by every module.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use home_automations::client::{ConnectionState, HubClient, ServiceCall};
/// use home_automations::transport::MemoryTransport;
///
/// # async fn example() -> home_automations::Result<()> {
/// let client = HubClient::new(Arc::new(MemoryTransport::new()));
/// assert_eq!(client.connect().await, ConnectionState::Connected);
///
/// client
///     .call_service(ServiceCall::new("light", "turn_on").target_entity("light.hall"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HubClient {
    transport: Arc<dyn HubTransport>,
    state: watch::Sender<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    retry_delay: Duration,
    unknown: Mutex<HashSet<String>>,
    cooldowns: Mutex<HashMap<ServiceFingerprint, Instant>>,
    hooks: RwLock<Vec<ConnectedHook>>,
}

impl HubClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            state,
            connect_lock: tokio::sync::Mutex::new(()),
            retry_delay: DEFAULT_RETRY_DELAY,
            unknown: Mutex::new(HashSet::new()),
            cooldowns: Mutex::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Sets the delay between failed connection attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns `true` while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.transport.is_connected()
    }

    /// Registers a hook run after every successful connection, including
    /// reconnections. Hooks run in registration order.
    pub fn on_connected(&self, hook: ConnectedHook) {
        self.hooks.write().push(hook);
    }

    /// Connects, retrying transient failures every retry delay until it
    /// succeeds.
    ///
    /// Returns immediately when already connected. Concurrent callers are
    /// serialized; only one attempt runs at a time. Rejected credentials
    /// move the client to [`ConnectionState::AuthFailed`], after which this
    /// method returns at once without touching the transport.
    pub async fn connect(&self) -> ConnectionState {
        let _guard = self.connect_lock.lock().await;

        loop {
            match self.state() {
                ConnectionState::AuthFailed => return ConnectionState::AuthFailed,
                ConnectionState::Connected if self.transport.is_connected() => {
                    return ConnectionState::Connected;
                }
                _ => {}
            }

            self.state.send_replace(ConnectionState::Connecting);
            match self.transport.connect().await {
                Ok(()) => {
                    self.state.send_replace(ConnectionState::Connected);
                    tracing::info!("Connected to hub");
                    self.run_hooks();
                    return ConnectionState::Connected;
                }
                Err(ProtocolError::AuthenticationFailed) => {
                    self.state.send_replace(ConnectionState::AuthFailed);
                    tracing::error!("Hub rejected the access token, giving up on connecting");
                    return ConnectionState::AuthFailed;
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    tracing::error!(
                        error = %e,
                        retry_in_secs = self.retry_delay.as_secs_f64(),
                        "Not connected to hub, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Drops the current connection so the next [`connect`](Self::connect)
    /// opens a fresh one. Has no effect after an authentication failure.
    pub async fn mark_disconnected(&self) {
        if self.state() == ConnectionState::AuthFailed {
            return;
        }
        self.transport.disconnect().await;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Moves the client to the terminal [`ConnectionState::AuthFailed`].
    pub async fn halt(&self) {
        self.state.send_replace(ConnectionState::AuthFailed);
        self.transport.disconnect().await;
    }

    /// Fetches the current state of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] the first time an unknown entity is
    /// requested and [`Error::NotFoundAgain`] on later requests for the same
    /// entity. Connection failures are returned as [`Error::Protocol`].
    pub async fn get_state(&self, entity_id: &str) -> Result<Snapshot> {
        self.ensure_usable()?;
        match self.transport.get_state(entity_id).await {
            Ok(snapshot) => {
                self.unknown.lock().remove(entity_id);
                Ok(snapshot)
            }
            Err(err) => Err(self.classify(entity_id, err)),
        }
    }

    /// Fetches a single attribute of an entity.
    ///
    /// # Errors
    ///
    /// See [`get_state`](Self::get_state).
    pub async fn get_attribute(&self, entity_id: &str, attribute: &str) -> Result<Option<Value>> {
        let snapshot = self.get_state(entity_id).await?;
        Ok(snapshot.attribute(attribute).cloned())
    }

    /// Invokes a service.
    ///
    /// If a call with the same fingerprint is still in its cooldown, the
    /// call is not sent. A call with a cooldown reserves the fingerprint
    /// before sending, so concurrent identical calls send at most once. The
    /// reservation is released if the call fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceTimeout`] if suppressed by a cooldown,
    /// [`Error::NotFound`]/[`Error::NotFoundAgain`] for unknown services,
    /// [`Error::CommandFailed`] if the hub reports a failure, and
    /// [`Error::Protocol`] for connection failures.
    pub async fn call_service(&self, call: ServiceCall) -> Result<()> {
        self.ensure_usable()?;

        let fingerprint = call.fingerprint();
        {
            let now = Instant::now();
            let mut cooldowns = self.cooldowns.lock();
            if let Some(expiry) = cooldowns.get(&fingerprint) {
                if *expiry > now {
                    return Err(Error::ServiceTimeout(fingerprint.to_string()));
                }
                cooldowns.remove(&fingerprint);
            }
            if let Some(cooldown) = call.cooldown() {
                cooldowns.insert(fingerprint.clone(), now + cooldown);
            }
        }

        tracing::debug!(service = %call, target = ?call.target(), "Calling service");
        match self.transport.call_service(&call).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if call.cooldown().is_some() {
                    self.cooldowns.lock().remove(&fingerprint);
                }
                Err(self.classify(&call.to_string(), err))
            }
        }
    }

    /// Subscribes to hub events and feeds each one to `on_event` until the
    /// subscription ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established. When the
    /// stream ends because the connection dropped, returns a
    /// connection-lost error so the caller can reconnect.
    pub async fn subscribe_events<F>(&self, mut on_event: F) -> Result<()>
    where
        F: FnMut(Event) + Send,
    {
        self.ensure_usable()?;
        let mut events = self.transport.subscribe_events().await?;
        tracing::info!("Subscribed to hub events");

        while let Some(event) = events.recv().await {
            on_event(event);
        }

        Err(ProtocolError::ConnectionLost("event stream ended".to_string()).into())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state() == ConnectionState::AuthFailed {
            return Err(ProtocolError::AuthenticationFailed.into());
        }
        Ok(())
    }

    fn classify(&self, key: &str, err: ProtocolError) -> Error {
        match err {
            ProtocolError::NotFound(_) => {
                if self.unknown.lock().insert(key.to_string()) {
                    Error::NotFound(key.to_string())
                } else {
                    Error::NotFoundAgain(key.to_string())
                }
            }
            ProtocolError::Rejected { code, message } => {
                Error::CommandFailed(format!("{key}: {message} ({code})"))
            }
            other => other.into(),
        }
    }

    fn run_hooks(&self) {
        let hooks = self.hooks.read().clone();
        for hook in hooks {
            hook();
        }
    }
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("state", &self.state())
            .field("retry_delay", &self.retry_delay)
            .field("hooks", &self.hooks.read().len())
            .finish_non_exhaustive()
    }
}
