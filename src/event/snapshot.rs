// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Immutable entity state snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Origin of a state change, as reported by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    /// Unique id of the context.
    #[serde(default)]
    pub id: Option<String>,
    /// User that caused the change, if it was triggered by a person or an
    /// API token. `None` for changes originating from devices.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Context that caused this one.
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// The state of one entity at one point in time.
///
/// Snapshots are read-only: handlers receive them by value and can keep them
/// as long as they like without observing later changes.
///
/// # Examples
///
/// ```
/// use home_automations::event::Snapshot;
///
/// let light = Snapshot::new("light.kitchen", "on")
///     .with_attribute("brightness", 180)
///     .with_user_id("3f1c");
///
/// assert!(light.is_on());
/// assert_eq!(light.attribute_f64("brightness"), Some(180.0));
/// assert_eq!(light.user_id(), Some("3f1c"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    context: Context,
}

impl Snapshot {
    /// Creates a snapshot without attributes or context.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            context: Context::default(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the user that caused this state.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    /// Sets the full context.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Returns the entity id.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the raw state string.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Returns a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns an attribute as a number.
    ///
    /// Numeric strings are accepted as well, since some integrations report
    /// numbers as text.
    #[must_use]
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the state parsed as a number, e.g. for temperature sensors.
    #[must_use]
    pub fn state_f64(&self) -> Option<f64> {
        self.state.trim().parse().ok()
    }

    /// Returns the change context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the user that caused this state, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.context.user_id.as_deref()
    }

    /// Returns `true` if the state is `"on"`.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    /// Returns `true` if the state is `"off"`.
    #[must_use]
    pub fn is_off(&self) -> bool {
        self.state == "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_hub_state_object() {
        let json = serde_json::json!({
            "entity_id": "climate.living_room",
            "state": "heat",
            "attributes": {"temperature": 21.5, "current_temperature": "20.1"},
            "last_changed": "2024-01-01T00:00:00+00:00",
            "context": {"id": "01H", "user_id": null, "parent_id": null}
        });

        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.entity_id(), "climate.living_room");
        assert_eq!(snapshot.state(), "heat");
        assert_eq!(snapshot.attribute_f64("temperature"), Some(21.5));
        assert_eq!(snapshot.attribute_f64("current_temperature"), Some(20.1));
        assert_eq!(snapshot.user_id(), None);
    }

    #[test]
    fn missing_attributes_and_context_default() {
        let json = serde_json::json!({"entity_id": "sun.sun", "state": "above_horizon"});
        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        assert!(snapshot.attributes().is_empty());
        assert_eq!(snapshot.context(), &Context::default());
    }

    #[test]
    fn numeric_state() {
        assert_eq!(Snapshot::new("sensor.t", "19.75").state_f64(), Some(19.75));
        assert_eq!(Snapshot::new("sensor.t", "unavailable").state_f64(), None);
    }

    #[test]
    fn on_off_helpers() {
        assert!(Snapshot::new("switch.a", "on").is_on());
        assert!(Snapshot::new("switch.a", "off").is_off());
        let unknown = Snapshot::new("switch.a", "unknown");
        assert!(!unknown.is_on() && !unknown.is_off());
    }
}
