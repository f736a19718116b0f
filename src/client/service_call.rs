// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service call requests and their cooldown fingerprints.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

/// A request to invoke a hub service, e.g. `light.turn_on`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use home_automations::client::ServiceCall;
///
/// let call = ServiceCall::new("climate", "set_temperature")
///     .target_entity("climate.office")
///     .with_data("temperature", 21.5)
///     .with_cooldown(Duration::from_secs(120));
///
/// assert_eq!(call.to_string(), "climate.set_temperature");
/// assert_eq!(call.cooldown(), Some(Duration::from_secs(120)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    domain: String,
    service: String,
    data: Option<Map<String, Value>>,
    target: Option<Map<String, Value>>,
    cooldown: Option<Duration>,
}

impl ServiceCall {
    /// Creates a call without data, target or cooldown.
    #[must_use]
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data: None,
            target: None,
            cooldown: None,
        }
    }

    /// Adds a service data field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Adds a target field, e.g. `device_id` or `area_id`.
    #[must_use]
    pub fn with_target(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.target
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Targets a single entity.
    #[must_use]
    pub fn target_entity(self, entity_id: impl Into<String>) -> Self {
        self.with_target("entity_id", entity_id.into())
    }

    /// Suppresses identical calls for `cooldown` after this one.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Returns the service domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the service data.
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> Option<&Map<String, Value>> {
        self.target.as_ref()
    }

    /// Returns the cooldown, if any.
    #[must_use]
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    /// Returns the identity used for cooldown suppression.
    #[must_use]
    pub fn fingerprint(&self) -> ServiceFingerprint {
        ServiceFingerprint {
            domain: self.domain.clone(),
            service: self.service.clone(),
            data_keys: self
                .data
                .as_ref()
                .map(|data| data.keys().cloned().collect()),
            target: self.target.as_ref().map(normalize_target),
        }
    }
}

impl fmt::Display for ServiceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)
    }
}

/// Identity of a service call for cooldown purposes.
///
/// Two calls share a fingerprint when they address the same service, set
/// the same data keys (values are ignored) and address the same target.
/// The target is compared by content so that calls to different entities
/// never suppress each other. List-valued targets compare as sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceFingerprint {
    domain: String,
    service: String,
    data_keys: Option<BTreeSet<String>>,
    target: Option<BTreeSet<(String, String)>>,
}

impl fmt::Display for ServiceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)?;
        if let Some(target) = &self.target {
            let ids: Vec<&str> = target.iter().map(|(_, v)| v.as_str()).collect();
            write!(f, " [{}]", ids.join(", "))?;
        }
        Ok(())
    }
}

fn normalize_target(target: &Map<String, Value>) -> BTreeSet<(String, String)> {
    let mut pairs = BTreeSet::new();
    for (key, value) in target {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), value_text(item))));
            }
            other => {
                pairs.insert((key.clone(), value_text(other)));
            }
        }
    }
    pairs
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
