// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handler registration for rule modules.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::event::{Event, Snapshot};
use crate::modules::Module;

/// Future returned by a registered handler.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

pub(super) type StateChangedHandler =
    Arc<dyn Fn(Arc<Event>, Snapshot, Snapshot) -> HandlerFuture + Send + Sync>;

pub(super) type DeviceEventHandler = Arc<dyn Fn(Arc<Event>, String) -> HandlerFuture + Send + Sync>;

/// The handlers one module registers with the router.
///
/// Handlers receive the module itself as their first argument, so they can
/// be written as plain async methods.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use home_automations::clock::ClockListener;
/// use home_automations::event::{Event, Snapshot};
/// use home_automations::modules::Module;
/// use home_automations::router::ModuleRegistration;
///
/// struct Porch;
///
/// impl Porch {
///     async fn on_motion(&self, _old: Snapshot, new: Snapshot) -> home_automations::Result<()> {
///         println!("motion is now {}", new.state());
///         Ok(())
///     }
/// }
///
/// #[async_trait]
/// impl ClockListener for Porch {}
///
/// #[async_trait]
/// impl Module for Porch {
///     fn name(&self) -> &str {
///         "porch"
///     }
/// }
///
/// let mut registration = ModuleRegistration::new(Arc::new(Porch));
/// registration.on_state_changed("binary_sensor.porch_motion", |porch, _event, old, new| async move {
///     porch.on_motion(old, new).await
/// });
/// assert_eq!(registration.handler_count(), 1);
/// ```
pub struct ModuleRegistration<M> {
    pub(super) module: Arc<M>,
    pub(super) state_changed: HashMap<String, Vec<StateChangedHandler>>,
    pub(super) device_events: HashMap<String, Vec<DeviceEventHandler>>,
}

impl<M: Module + 'static> ModuleRegistration<M> {
    /// Starts a registration for `module`.
    #[must_use]
    pub fn new(module: Arc<M>) -> Self {
        Self {
            module,
            state_changed: HashMap::new(),
            device_events: HashMap::new(),
        }
    }

    /// Returns the registered module.
    #[must_use]
    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    /// Calls `handler` whenever `entity_id` changes state.
    ///
    /// The handler is only called when both the old and the new snapshot
    /// are present.
    pub fn on_state_changed<F, Fut>(&mut self, entity_id: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Arc<M>, Arc<Event>, Snapshot, Snapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let module = Arc::clone(&self.module);
        let handler: StateChangedHandler = Arc::new(move |event, old, new| {
            Box::pin(handler(Arc::clone(&module), event, old, new))
        });
        self.state_changed
            .entry(entity_id.into())
            .or_default()
            .push(handler);
        self
    }

    /// Calls `handler` whenever the device `device_id` emits an event.
    pub fn on_device_event<F, Fut>(&mut self, device_id: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Arc<M>, Arc<Event>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let module = Arc::clone(&self.module);
        let handler: DeviceEventHandler =
            Arc::new(move |event, device| Box::pin(handler(Arc::clone(&module), event, device)));
        self.device_events
            .entry(device_id.into())
            .or_default()
            .push(handler);
        self
    }

    /// Returns the total number of handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.state_changed.values().map(Vec::len).sum::<usize>()
            + self.device_events.values().map(Vec::len).sum::<usize>()
    }
}
