// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process hub.
//!
//! [`MemoryTransport`] keeps entity states in memory, records every service
//! call and lets callers inject events and connection failures. Calls to
//! `turn_on`, `turn_off` and `toggle` on a known entity update its state and
//! emit a matching state-changed event, which is enough to exercise modules
//! end to end.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{EVENT_CHANNEL_CAPACITY, HubTransport};
use crate::client::ServiceCall;
use crate::error::ProtocolError;
use crate::event::{Context, Event, Snapshot};

/// An in-memory hub.
///
/// # Examples
///
/// ```
/// use home_automations::event::Snapshot;
/// use home_automations::transport::{HubTransport, MemoryTransport};
///
/// # async fn example() -> Result<(), home_automations::ProtocolError> {
/// let hub = MemoryTransport::new();
/// hub.set_state(Snapshot::new("light.kitchen", "off"));
///
/// hub.connect().await?;
/// let state = hub.get_state("light.kitchen").await?;
/// assert_eq!(state.state(), "off");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryTransport {
    states: Mutex<HashMap<String, Snapshot>>,
    known_services: Mutex<Option<HashSet<String>>>,
    rejected_services: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<ServiceCall>>,
    connect_script: Mutex<VecDeque<ProtocolError>>,
    connect_attempts: AtomicUsize,
    connected: AtomicBool,
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
    acting_user: Mutex<Option<String>>,
}

impl MemoryTransport {
    /// Creates an empty hub. All services are accepted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or replaces an entity state without emitting an event.
    pub fn set_state(&self, snapshot: Snapshot) {
        self.states
            .lock()
            .insert(snapshot.entity_id().to_string(), snapshot);
    }

    /// Returns the current state of an entity.
    #[must_use]
    pub fn state(&self, entity_id: &str) -> Option<Snapshot> {
        self.states.lock().get(entity_id).cloned()
    }

    /// Changes an entity state and emits the matching state-changed event.
    ///
    /// Returns `true` if at least one subscriber received the event.
    pub async fn change_state(&self, snapshot: Snapshot) -> bool {
        let entity_id = snapshot.entity_id().to_string();
        let old = self.states.lock().insert(entity_id.clone(), snapshot.clone());
        self.inject(Event::state_changed(entity_id, old, Some(snapshot)))
            .await
    }

    /// Restricts accepted services to the given `domain.service` names.
    /// Anything else is answered with "not found".
    pub fn restrict_services<I, S>(&self, services: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.known_services.lock() = Some(services.into_iter().map(Into::into).collect());
    }

    /// Makes calls to `domain.service` fail with the given message.
    pub fn reject_service(&self, service: impl Into<String>, message: impl Into<String>) {
        self.rejected_services
            .lock()
            .insert(service.into(), message.into());
    }

    /// Accepts every previously rejected service again.
    pub fn clear_rejections(&self) {
        self.rejected_services.lock().clear();
    }

    /// Sets the user id attached to state changes caused by service calls.
    pub fn set_acting_user(&self, user_id: Option<&str>) {
        *self.acting_user.lock() = user_id.map(str::to_string);
    }

    /// Queues an error for the next connection attempt. Queued errors are
    /// consumed in order, one per attempt.
    pub fn fail_next_connect(&self, error: ProtocolError) {
        self.connect_script.lock().push_back(error);
    }

    /// Returns how many times [`connect`](HubTransport::connect) was called.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Acquire)
    }

    /// Returns all service calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls made to `domain.service`.
    #[must_use]
    pub fn calls_to(&self, domain: &str, service: &str) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.domain() == domain && c.service() == service)
            .cloned()
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Delivers an event to every subscriber.
    ///
    /// Returns `true` if at least one subscriber received it.
    pub async fn inject(&self, event: Event) -> bool {
        let subscribers = self.subscribers.lock().clone();
        let mut delivered = false;
        for subscriber in subscribers {
            delivered |= subscriber.send(event.clone()).await.is_ok();
        }
        delivered
    }

    /// Simulates the hub going away: subscriptions end and requests fail
    /// until the next successful connect.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::Release);
        self.subscribers.lock().clear();
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().iter().filter(|s| !s.is_closed()).count()
    }

    fn ensure_connected(&self) -> Result<(), ProtocolError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    fn apply_effect(&self, call: &ServiceCall) -> Option<Event> {
        let new_state = match call.service() {
            "turn_on" => "on",
            "turn_off" => "off",
            "toggle" => "",
            _ => return None,
        };
        let entity_id = call.target()?.get("entity_id")?.as_str()?.to_string();

        let mut states = self.states.lock();
        let old = states.get(&entity_id)?.clone();
        let new_state = match new_state {
            "" if old.is_on() => "off",
            "" => "on",
            s => s,
        };

        let mut attributes = old.attributes().clone();
        if let Some(data) = call.data() {
            attributes.extend(data.clone());
        }
        let mut new = Snapshot::new(entity_id.clone(), new_state).with_context(Context {
            user_id: self.acting_user.lock().clone(),
            ..Context::default()
        });
        for (key, value) in attributes {
            new = new.with_attribute(key, value);
        }

        states.insert(entity_id.clone(), new.clone());
        Some(Event::state_changed(entity_id, Some(old), Some(new)))
    }
}

#[async_trait]
impl HubTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), ProtocolError> {
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);
        let scripted = self.connect_script.lock().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) {
        self.drop_connection();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn get_state(&self, entity_id: &str) -> Result<Snapshot, ProtocolError> {
        self.ensure_connected()?;
        self.state(entity_id)
            .ok_or_else(|| ProtocolError::NotFound(entity_id.to_string()))
    }

    async fn call_service(&self, call: &ServiceCall) -> Result<(), ProtocolError> {
        self.ensure_connected()?;

        let name = call.to_string();
        if let Some(known) = self.known_services.lock().as_ref()
            && !known.contains(&name)
        {
            return Err(ProtocolError::NotFound(format!("Service {name} not found.")));
        }
        let rejected = self.rejected_services.lock().get(&name).cloned();
        if let Some(message) = rejected {
            return Err(ProtocolError::Rejected {
                code: "home_assistant_error".to_string(),
                message,
            });
        }

        self.calls.lock().push(call.clone());
        tracing::debug!(service = %name, data = ?call.data().map(|d| serde_json::Value::Object(d.clone())), "Service called");

        if let Some(event) = self.apply_effect(call) {
            self.inject(event).await;
        }
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<Event>, ProtocolError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}
