// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub event types.

use serde::Deserialize;
use serde_json::Value;

use super::{Context, Snapshot};

/// Event type of entity state changes.
pub const STATE_CHANGED: &str = "state_changed";

/// Event type of Zigbee device events.
pub const DEVICE_EVENT: &str = "zha_event";

/// An event exactly as it arrives from the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
    /// Event type, e.g. `"state_changed"`.
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Context of the event.
    #[serde(default)]
    pub context: Context,
}

/// An event from the hub, classified by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Any event without a dedicated variant.
    Generic {
        /// Event type.
        event_type: String,
        /// Raw event payload.
        data: Value,
    },

    /// An entity changed state.
    ///
    /// Either side may be missing: `old_state` is absent when an entity is
    /// created, `new_state` when it is removed.
    StateChanged {
        /// The entity that changed.
        entity_id: String,
        /// State before the change.
        old_state: Option<Snapshot>,
        /// State after the change.
        new_state: Option<Snapshot>,
    },

    /// A device emitted a command, e.g. a button press on a remote.
    Device {
        /// Event type.
        event_type: String,
        /// Hardware identifier of the device (IEEE address for Zigbee).
        device_id: Option<String>,
        /// Command name, opaque to the controller.
        command: Option<String>,
        /// Raw event payload.
        data: Value,
    },
}

impl Event {
    /// Creates a state-changed event.
    #[must_use]
    pub fn state_changed(
        entity_id: impl Into<String>,
        old_state: Option<Snapshot>,
        new_state: Option<Snapshot>,
    ) -> Self {
        Self::StateChanged {
            entity_id: entity_id.into(),
            old_state,
            new_state,
        }
    }

    /// Creates a device event.
    #[must_use]
    pub fn device(device_id: Option<&str>, command: Option<&str>) -> Self {
        let mut data = serde_json::Map::new();
        if let Some(id) = device_id {
            data.insert("device_ieee".to_string(), Value::from(id));
        }
        if let Some(command) = command {
            data.insert("command".to_string(), Value::from(command));
        }
        Self::Device {
            event_type: DEVICE_EVENT.to_string(),
            device_id: device_id.map(str::to_string),
            command: command.map(str::to_string),
            data: Value::Object(data),
        }
    }

    /// Converts a raw hub event.
    ///
    /// A state-changed event without an entity id is kept as
    /// [`Event::Generic`]. Snapshots that are `null` or malformed become
    /// `None`.
    #[must_use]
    pub fn from_raw(raw: RawEvent) -> Self {
        match raw.event_type.as_str() {
            STATE_CHANGED => {
                let Some(entity_id) = string_field(&raw.data, "entity_id") else {
                    return Self::Generic {
                        event_type: raw.event_type,
                        data: raw.data,
                    };
                };
                Self::StateChanged {
                    entity_id,
                    old_state: snapshot_field(&raw.data, "old_state"),
                    new_state: snapshot_field(&raw.data, "new_state"),
                }
            }
            DEVICE_EVENT => Self::Device {
                device_id: string_field(&raw.data, "device_ieee"),
                command: string_field(&raw.data, "command"),
                event_type: raw.event_type,
                data: raw.data,
            },
            _ => Self::Generic {
                event_type: raw.event_type,
                data: raw.data,
            },
        }
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Generic { event_type, .. } | Self::Device { event_type, .. } => event_type,
            Self::StateChanged { .. } => STATE_CHANGED,
        }
    }

    /// Returns the entity id of a state-changed event.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { entity_id, .. } => Some(entity_id),
            _ => None,
        }
    }

    /// Returns the device id of a device event.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Device { device_id, .. } => device_id.as_deref(),
            _ => None,
        }
    }

    /// Returns the command of a device event.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Device { command, .. } => command.as_deref(),
            _ => None,
        }
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)?.as_str().map(str::to_string)
}

fn snapshot_field(data: &Value, key: &str) -> Option<Snapshot> {
    let value = data.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::debug!(field = key, error = %e, "Ignoring malformed state snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event_type: &str, data: Value) -> RawEvent {
        RawEvent {
            event_type: event_type.to_string(),
            data,
            context: Context::default(),
        }
    }

    #[test]
    fn converts_state_changed() {
        let event = Event::from_raw(raw(
            "state_changed",
            json!({
                "entity_id": "light.hall",
                "old_state": {"entity_id": "light.hall", "state": "off"},
                "new_state": {"entity_id": "light.hall", "state": "on",
                              "context": {"user_id": "abc"}}
            }),
        ));

        let Event::StateChanged {
            entity_id,
            old_state,
            new_state,
        } = event
        else {
            panic!("expected state change");
        };
        assert_eq!(entity_id, "light.hall");
        assert_eq!(old_state.unwrap().state(), "off");
        assert_eq!(new_state.unwrap().user_id(), Some("abc"));
    }

    #[test]
    fn null_side_becomes_none() {
        let event = Event::from_raw(raw(
            "state_changed",
            json!({
                "entity_id": "sensor.new",
                "old_state": null,
                "new_state": {"entity_id": "sensor.new", "state": "1"}
            }),
        ));
        assert!(matches!(
            event,
            Event::StateChanged { old_state: None, new_state: Some(_), .. }
        ));
    }

    #[test]
    fn state_changed_without_entity_is_generic() {
        let event = Event::from_raw(raw("state_changed", json!({})));
        assert!(matches!(event, Event::Generic { .. }));
        assert_eq!(event.event_type(), "state_changed");
    }

    #[test]
    fn converts_device_event() {
        let event = Event::from_raw(raw(
            "zha_event",
            json!({"device_ieee": "00:15:8d:00:01", "command": "on", "args": []}),
        ));
        assert_eq!(event.device_id(), Some("00:15:8d:00:01"));
        assert_eq!(event.command(), Some("on"));
    }

    #[test]
    fn device_event_without_id() {
        let event = Event::from_raw(raw("zha_event", json!({"command": "off"})));
        assert!(matches!(event, Event::Device { device_id: None, .. }));
    }

    #[test]
    fn other_events_are_generic() {
        let event = Event::from_raw(raw("call_service", json!({"domain": "light"})));
        assert_eq!(event.event_type(), "call_service");
        assert_eq!(event.entity_id(), None);
        assert_eq!(event.device_id(), None);
    }
}
