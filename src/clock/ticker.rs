// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The polling clock.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Timelike};
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::task::{ScheduledTask, TaskFn};
use super::{Boundary, ClockListener, TaskId, TimeSource};
use crate::error::{Result, ValueError};
use crate::supervisor::Supervisor;
use crate::types::Schedule;

/// How often [`Clock::run`] polls the time source.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(250);

/// Shortest interval accepted by [`Clock::schedule`].
pub const MIN_TASK_INTERVAL: Duration = Duration::from_secs(1);

/// Last observed calendar values. `None` until the first tick, so the
/// first tick reports every boundary.
#[derive(Debug, Default)]
struct LastSeen {
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
}

impl LastSeen {
    fn advance(&mut self, now: &DateTime<Tz>) -> Vec<(Boundary, u32)> {
        let mut crossed = Vec::new();
        for (boundary, slot, value) in [
            (Boundary::Day, &mut self.day, now.day()),
            (Boundary::Hour, &mut self.hour, now.hour()),
            (Boundary::Minute, &mut self.minute, now.minute()),
            (Boundary::Second, &mut self.second, now.second()),
        ] {
            if *slot != Some(value) {
                *slot = Some(value);
                crossed.push((boundary, value));
            }
        }
        crossed
    }
}

/// Detects calendar boundaries and runs recurring tasks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use chrono::TimeZone;
/// use chrono_tz::Europe::Berlin;
/// use home_automations::client::HubClient;
/// use home_automations::clock::{Clock, ManualTime};
/// use home_automations::supervisor::Supervisor;
/// use home_automations::transport::MemoryTransport;
///
/// # async fn example() {
/// let client = Arc::new(HubClient::new(Arc::new(MemoryTransport::new())));
/// let time = Arc::new(ManualTime::new(Berlin.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()));
/// let clock = Clock::new(time.clone(), Supervisor::new(client));
///
/// clock
///     .schedule("heartbeat", Duration::from_secs(5), || async { Ok(()) })
///     .unwrap();
/// assert!(clock.schedule("too fast", Duration::from_millis(500), || async { Ok(()) }).is_err());
/// # }
/// ```
pub struct Clock {
    source: Arc<dyn TimeSource>,
    supervisor: Arc<Supervisor>,
    last_seen: Mutex<LastSeen>,
    listeners: RwLock<Vec<Arc<dyn ClockListener>>>,
    tasks: Mutex<Vec<ScheduledTask>>,
    next_task_id: AtomicU64,
}

impl Clock {
    /// Creates a clock reading `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TimeSource>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            source,
            supervisor,
            last_seen: Mutex::new(LastSeen::default()),
            listeners: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Returns the current local time.
    #[must_use]
    pub fn now(&self) -> DateTime<Tz> {
        self.source.now()
    }

    /// Returns the current local time of day.
    #[must_use]
    pub fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }

    /// Resolves `schedule` at the current time of day.
    ///
    /// # Errors
    ///
    /// See [`Schedule::resolve_at`].
    pub fn resolve_schedule<'a, V>(&self, schedule: &'a Schedule<V>) -> Result<&'a V> {
        Ok(schedule.resolve_at(self.time_of_day())?)
    }

    /// Adds a boundary listener. Listeners are notified in registration
    /// order.
    pub fn register(&self, listener: Arc<dyn ClockListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Registers a task run every `interval`, starting one interval from
    /// now.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::IntervalTooShort`] if `interval` is below one
    /// second.
    pub fn schedule<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: F,
    ) -> std::result::Result<TaskId, ValueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if interval < MIN_TASK_INTERVAL {
            return Err(ValueError::IntervalTooShort(interval));
        }
        let step =
            TimeDelta::from_std(interval).map_err(|_| ValueError::IntervalTooShort(interval))?;

        let id = TaskId::new(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        let run: TaskFn = Arc::new(move || Box::pin(task()));

        tracing::debug!(task = %name, interval_secs = interval.as_secs_f64(), "Scheduled task");
        self.tasks.lock().push(ScheduledTask {
            id,
            name,
            interval: step,
            last_run: self.now(),
            run,
        });
        Ok(id)
    }

    /// Removes a scheduled task. Returns `true` if it existed.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        tasks.len() != before
    }

    /// Polls the time source once.
    ///
    /// Spawns one callback per listener for every crossed boundary (day,
    /// then hour, minute, second) followed by every due task. Returns the
    /// handles of the spawned callbacks; the clock itself never waits for
    /// them.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let now = self.now();
        let crossed = self.last_seen.lock().advance(&now);
        let mut spawned = Vec::new();

        if !crossed.is_empty() {
            let listeners = self.listeners.read().clone();
            for (boundary, value) in crossed {
                for listener in &listeners {
                    let listener = Arc::clone(listener);
                    spawned.push(self.supervisor.spawn(
                        format!("clock {boundary}"),
                        async move {
                            match boundary {
                                Boundary::Day => listener.on_day_changed(value).await,
                                Boundary::Hour => listener.on_hour_changed(value).await,
                                Boundary::Minute => listener.on_minute_changed(value).await,
                                Boundary::Second => listener.on_second_changed(value).await,
                            }
                        },
                    ));
                }
            }
        }

        let due: Vec<(String, TaskFn)> = {
            let mut tasks = self.tasks.lock();
            tasks
                .iter_mut()
                .filter(|task| task.is_due(now))
                .map(|task| {
                    task.last_run = now;
                    (task.name.clone(), Arc::clone(&task.run))
                })
                .collect()
        };
        for (name, run) in due {
            spawned.push(self.supervisor.spawn(name, run()));
        }

        spawned
    }

    /// Polls every `period` forever.
    ///
    /// # Errors
    ///
    /// Never returns under normal operation; the signature lets the loop
    /// run as a supervised task.
    pub async fn run(&self, period: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("source", &self.source)
            .field("listeners", &self.listener_count())
            .field("tasks", &self.tasks.lock().len())
            .finish_non_exhaustive()
    }
}
