// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall-clock boundaries and recurring tasks.
//!
//! The [`Clock`] is polled a few times per second. On each poll it compares
//! the current day, hour, minute and second with the values it saw last and
//! notifies every [`ClockListener`] of each boundary that was crossed, in
//! order from day down to second. It also runs interval tasks registered
//! with [`Clock::schedule`].
//!
//! Listener callbacks and tasks are spawned under the
//! [`Supervisor`](crate::supervisor::Supervisor); a slow or failing callback
//! never delays the clock.

mod task;
mod ticker;
mod time_source;

pub use task::TaskId;
pub use ticker::{Clock, DEFAULT_TICK_PERIOD, MIN_TASK_INTERVAL};
pub use time_source::{ManualTime, TimeSource, WallTime};

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// A calendar unit whose change the clock reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Day of month changed.
    Day,
    /// Hour changed.
    Hour,
    /// Minute changed.
    Minute,
    /// Second changed.
    Second,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        };
        f.write_str(name)
    }
}

/// Receiver of clock boundary notifications.
///
/// Every method has an empty default, so implementors only override the
/// boundaries they care about. Each callback receives the new value of its
/// unit (day of month, hour, minute or second).
#[async_trait]
pub trait ClockListener: Send + Sync {
    /// Called when the day of month changes.
    async fn on_day_changed(&self, _day: u32) -> Result<()> {
        Ok(())
    }

    /// Called when the hour changes.
    async fn on_hour_changed(&self, _hour: u32) -> Result<()> {
        Ok(())
    }

    /// Called when the minute changes.
    async fn on_minute_changed(&self, _minute: u32) -> Result<()> {
        Ok(())
    }

    /// Called when the second changes.
    async fn on_second_changed(&self, _second: u32) -> Result<()> {
        Ok(())
    }
}
