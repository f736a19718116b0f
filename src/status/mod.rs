// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Liveness timestamps.
//!
//! [`StatusTracker`] remembers when the last hub state change arrived and
//! when the status endpoint was last posted to. An external watchdog polls
//! `GET /status` and restarts the controller once `last_state_changed` goes
//! stale; the heartbeat module keeps it fresh while the hub round trip
//! works.

#[cfg(feature = "api")]
mod server;

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "api")]
pub use server::{router, serve};

use crate::clock::TimeSource;

/// Body of the status endpoint. Both values are RFC 3339 timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// When the heartbeat switch last changed state.
    pub last_state_changed: String,
    /// When `POST /status` was last called.
    pub last_post: String,
}

#[derive(Debug, Clone, Copy)]
struct Stamps {
    last_state_changed: DateTime<Tz>,
    last_post: DateTime<Tz>,
}

/// Thread-safe liveness timestamps. Both start at creation time.
#[derive(Debug)]
pub struct StatusTracker {
    source: Arc<dyn TimeSource>,
    stamps: Mutex<Stamps>,
}

impl StatusTracker {
    /// Creates a tracker reading time from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let now = source.now();
        Self {
            source,
            stamps: Mutex::new(Stamps {
                last_state_changed: now,
                last_post: now,
            }),
        }
    }

    /// Records a state change.
    pub fn touch_state_changed(&self) {
        let now = self.source.now();
        self.stamps.lock().last_state_changed = now;
    }

    /// Records a post to the status endpoint.
    pub fn touch_post(&self) {
        let now = self.source.now();
        self.stamps.lock().last_post = now;
    }

    /// Returns when the last state change was recorded.
    #[must_use]
    pub fn last_state_changed(&self) -> DateTime<Tz> {
        self.stamps.lock().last_state_changed
    }

    /// Returns when the last post was recorded.
    #[must_use]
    pub fn last_post(&self) -> DateTime<Tz> {
        self.stamps.lock().last_post
    }

    /// Returns both timestamps.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        let stamps = *self.stamps.lock();
        StatusReport {
            last_state_changed: stamps.last_state_changed.to_rfc3339(),
            last_post: stamps.last_post.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    use super::*;
    use crate::clock::ManualTime;

    #[test]
    fn touches_are_independent() {
        let time = Arc::new(ManualTime::new(
            Berlin.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
        ));
        let tracker = StatusTracker::new(Arc::clone(&time) as Arc<dyn TimeSource>);

        time.advance(Duration::from_secs(30));
        tracker.touch_state_changed();
        time.advance(Duration::from_secs(30));
        tracker.touch_post();

        assert_eq!(
            tracker.report(),
            StatusReport {
                last_state_changed: "2024-01-10T08:00:30+01:00".to_string(),
                last_post: "2024-01-10T08:01:00+01:00".to_string(),
            }
        );
        assert!(tracker.last_post() > tracker.last_state_changed());
    }
}
