// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transports connecting the controller to the hub.
//!
//! A [`HubTransport`] speaks the hub's wire protocol. It knows nothing about
//! retries, cooldowns or "not found" bookkeeping; those live in
//! [`HubClient`](crate::client::HubClient).
//!
//! # Transports
//!
//! - [`WebSocketTransport`]: the hub's websocket API
//! - [`MemoryTransport`]: an in-process hub for tests and dry runs

mod memory;
mod websocket;

pub use memory::MemoryTransport;
pub use websocket::{WebSocketConfig, WebSocketTransport};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::ServiceCall;
use crate::error::ProtocolError;
use crate::event::{Event, Snapshot};

/// Capacity of the channel carrying subscribed events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Wire-level access to the hub.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Opens the connection and authenticates.
    ///
    /// Calling this while connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] if the hub rejects the
    /// credentials, or another `ProtocolError` if the hub is unreachable.
    async fn connect(&self) -> Result<(), ProtocolError>;

    /// Closes the connection. Pending requests fail and subscriptions end.
    async fn disconnect(&self);

    /// Returns `true` while the connection is usable.
    fn is_connected(&self) -> bool;

    /// Fetches the current state of one entity.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotFound`] if the hub does not know the
    /// entity.
    async fn get_state(&self, entity_id: &str) -> Result<Snapshot, ProtocolError>;

    /// Invokes a service.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotFound`] for unknown services and
    /// [`ProtocolError::Rejected`] if the hub reports a failure.
    async fn call_service(&self, call: &ServiceCall) -> Result<(), ProtocolError>;

    /// Subscribes to all hub events.
    ///
    /// The returned channel closes when the connection is lost.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the subscription cannot be established.
    async fn subscribe_events(&self) -> Result<mpsc::Receiver<Event>, ProtocolError>;
}
