// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered event dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::ModuleRegistration;
use super::registration::{DeviceEventHandler, StateChangedHandler};
use crate::event::Event;
use crate::modules::Module;
use crate::supervisor::Supervisor;

struct Entry {
    name: String,
    module: Arc<dyn Module>,
    state_changed: HashMap<String, Vec<StateChangedHandler>>,
    device_events: HashMap<String, Vec<DeviceEventHandler>>,
}

/// Delivers hub events to registered modules.
pub struct EventRouter {
    supervisor: Arc<Supervisor>,
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl EventRouter {
    /// Creates a router with no modules.
    #[must_use]
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Adds a module and its handlers. Modules receive events in the order
    /// they were registered.
    pub fn register<M: Module + 'static>(&self, registration: ModuleRegistration<M>) {
        let ModuleRegistration {
            module,
            state_changed,
            device_events,
        } = registration;

        let entry = Entry {
            name: module.name().to_string(),
            module: module as Arc<dyn Module>,
            state_changed,
            device_events,
        };
        tracing::debug!(
            module = %entry.name,
            entities = entry.state_changed.len(),
            devices = entry.device_events.len(),
            "Registered module"
        );
        self.entries.write().push(Arc::new(entry));
    }

    /// Returns the names of all registered modules in dispatch order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.name.clone()).collect()
    }

    /// Delivers one event to every module.
    ///
    /// Returns how many entity or device handlers were invoked. Generic
    /// `on_event` calls are not counted.
    pub async fn dispatch(&self, event: Arc<Event>) -> usize {
        let entries = self.entries.read().clone();
        let mut invoked = 0;

        for entry in entries {
            self.supervisor
                .guard(&entry.name, entry.module.on_event(&event))
                .await;

            match &*event {
                Event::StateChanged {
                    entity_id,
                    old_state: Some(old),
                    new_state: Some(new),
                } => {
                    let Some(handlers) = entry.state_changed.get(entity_id) else {
                        continue;
                    };
                    for handler in handlers {
                        invoked += 1;
                        let work = handler(Arc::clone(&event), old.clone(), new.clone());
                        self.supervisor.guard(&entry.name, work).await;
                    }
                }
                Event::Device {
                    device_id: Some(device_id),
                    ..
                } => {
                    let Some(handlers) = entry.device_events.get(device_id) else {
                        continue;
                    };
                    for handler in handlers {
                        invoked += 1;
                        let work = handler(Arc::clone(&event), device_id.clone());
                        self.supervisor.guard(&entry.name, work).await;
                    }
                }
                _ => {}
            }
        }

        invoked
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("modules", &self.module_names())
            .finish_non_exhaustive()
    }
}
