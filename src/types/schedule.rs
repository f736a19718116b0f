// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-of-day keyed schedules.
//!
//! A [`Schedule`] maps time-of-day strings to values. The active value at a
//! given moment is the one whose key is the latest time not after that
//! moment. Before the earliest key of the day, the schedule wraps around and
//! the latest key of the previous day stays active.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ValueError;

use super::parse_time_of_day;

/// Values keyed by time of day.
///
/// Keys are kept in their original string form so the schedule serializes
/// back exactly as it was written.
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use home_automations::types::Schedule;
///
/// let schedule = Schedule::from_iter([("06:00", 20.0), ("22:00", 17.0)]);
/// let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
///
/// assert_eq!(*schedule.resolve_at(at(5, 59)).unwrap(), 17.0);
/// assert_eq!(*schedule.resolve_at(at(6, 0)).unwrap(), 20.0);
/// assert_eq!(*schedule.resolve_at(at(23, 0)).unwrap(), 17.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule<V> {
    entries: BTreeMap<String, V>,
}

impl<V> Schedule<V> {
    /// Creates an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Inserts or replaces the value for a key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(key.into(), value)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the schedule has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value stored under a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Checks that the schedule has entries and every key parses as a time
    /// of day.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptySchedule`] for an empty schedule, else the
    /// first [`ValueError::InvalidTimeOfDay`] encountered.
    pub fn validate(&self) -> Result<(), ValueError> {
        if self.entries.is_empty() {
            return Err(ValueError::EmptySchedule);
        }
        self.entries
            .keys()
            .try_for_each(|key| parse_time_of_day(key).map(|_| ()))
    }

    /// Returns the key that is active at `now`.
    ///
    /// A single-entry schedule always resolves to its only key. Otherwise
    /// the latest key not after `now` wins; if every key is after `now`, the
    /// latest key overall is active.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptySchedule`] for an empty schedule and
    /// [`ValueError::InvalidTimeOfDay`] if a key cannot be parsed.
    pub fn resolve_key_at(&self, now: NaiveTime) -> Result<&str, ValueError> {
        let mut keys = self.entries.keys();
        let first = keys.next().ok_or(ValueError::EmptySchedule)?;
        if self.entries.len() == 1 {
            return Ok(first);
        }

        let mut reached: Option<(NaiveTime, &str)> = None;
        let mut latest: Option<(NaiveTime, &str)> = None;
        for key in self.entries.keys() {
            let time = parse_time_of_day(key)?;
            if time <= now && reached.is_none_or(|(t, _)| time > t) {
                reached = Some((time, key));
            }
            if latest.is_none_or(|(t, _)| time > t) {
                latest = Some((time, key));
            }
        }

        reached
            .or(latest)
            .map(|(_, key)| key)
            .ok_or(ValueError::EmptySchedule)
    }

    /// Returns the value that is active at `now`.
    ///
    /// # Errors
    ///
    /// See [`resolve_key_at`](Self::resolve_key_at).
    pub fn resolve_at(&self, now: NaiveTime) -> Result<&V, ValueError> {
        let key = self.resolve_key_at(now)?;
        self.entries.get(key).ok_or(ValueError::EmptySchedule)
    }

    /// Overwrites the value of the entry that is active at `now`.
    ///
    /// Returns the key that was updated.
    ///
    /// # Errors
    ///
    /// See [`resolve_key_at`](Self::resolve_key_at).
    pub fn set_at(&mut self, now: NaiveTime, value: V) -> Result<String, ValueError> {
        let key = self.resolve_key_at(now)?.to_string();
        self.entries.insert(key.clone(), value);
        Ok(key)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Schedule<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
