// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-slot delayed actions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::supervisor::Supervisor;

/// Holds at most one delayed action.
///
/// Scheduling a new action aborts the previous one if it has not run yet.
#[derive(Debug, Default)]
pub struct PendingAction {
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl PendingAction {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` after `delay` under the supervisor, replacing any
    /// pending action.
    pub fn schedule<F>(
        &self,
        supervisor: &Arc<Supervisor>,
        context: impl Into<String>,
        delay: Duration,
        work: F,
    ) where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = supervisor.spawn(context, async move {
            tokio::time::sleep(delay).await;
            work.await
        });
        if let Some(previous) = self.slot.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Aborts the pending action. Returns `true` if one was still waiting
    /// or running.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Returns `true` while an action is waiting or running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PendingAction {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.get_mut().take() {
            handle.abort();
        }
    }
}
