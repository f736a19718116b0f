// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recurring tasks run by the clock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use futures_util::future::BoxFuture;

use crate::error::Result;

pub(super) type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Identifier of a scheduled task, unique per clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(super) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

pub(super) struct ScheduledTask {
    pub(super) id: TaskId,
    pub(super) name: String,
    pub(super) interval: TimeDelta,
    pub(super) last_run: DateTime<Tz>,
    pub(super) run: TaskFn,
}

impl ScheduledTask {
    /// A task is due once a full interval has passed since it last ran.
    pub(super) fn is_due(&self, now: DateTime<Tz>) -> bool {
        now.signed_duration_since(self.last_run) >= self.interval
    }
}
