// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sources of the current local time.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

/// Provides the current time in the configured zone.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Returns the current local time.
    fn now(&self) -> DateTime<Tz>;
}

/// The system clock viewed in a fixed IANA zone.
#[derive(Debug, Clone, Copy)]
pub struct WallTime {
    zone: Tz,
}

impl WallTime {
    /// Creates a wall clock for `zone`.
    #[must_use]
    pub const fn new(zone: Tz) -> Self {
        Self { zone }
    }
}

impl TimeSource for WallTime {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{TimeZone, Timelike};
/// use chrono_tz::Europe::Berlin;
/// use home_automations::clock::{ManualTime, TimeSource};
///
/// let time = ManualTime::new(Berlin.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap());
/// time.advance(Duration::from_secs(90));
/// assert_eq!(time.now().minute(), 1);
/// ```
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<DateTime<Tz>>,
}

impl ManualTime {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock() = now;
    }

    /// Moves forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock()
    }
}
