// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide error supervision.
//!
//! Every module dispatch, clock callback and scheduled task runs under the
//! [`Supervisor`]. Failures never propagate past it: each error is
//! classified with [`Error::kind`](crate::Error::kind) and handled according
//! to its [`Disposition`]. Panics are caught and treated as unclassified
//! errors.
//!
//! Connection failures trigger at most one reconnection at a time. Tasks
//! that only make sense while connected (the event subscription and the
//! clock loop) are registered as *dependents* and are aborted before the
//! reconnection starts; the client's on-connected hooks start them again.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::client::{ConnectionState, HubClient};
use crate::error::{Disposition, Error, Result};

/// Applies the error taxonomy to failures of supervised work.
pub struct Supervisor {
    client: Arc<HubClient>,
    reconnecting: watch::Sender<bool>,
    reconnects: AtomicUsize,
    dependents: Mutex<Vec<AbortHandle>>,
}

impl Supervisor {
    /// Creates a supervisor reconnecting through `client`.
    #[must_use]
    pub fn new(client: Arc<HubClient>) -> Arc<Self> {
        let (reconnecting, _) = watch::channel(false);
        Arc::new(Self {
            client,
            reconnecting,
            reconnects: AtomicUsize::new(0),
            dependents: Mutex::new(Vec::new()),
        })
    }

    /// Returns the supervised client.
    #[must_use]
    pub fn client(&self) -> &Arc<HubClient> {
        &self.client
    }

    /// Handles one error and returns what was done with it.
    pub fn handle(self: &Arc<Self>, context: &str, error: &Error) -> Disposition {
        let kind = error.kind();
        let disposition = kind.disposition();
        match disposition {
            Disposition::Report => {
                tracing::error!(context, ?kind, error = %error, "Task failed");
            }
            Disposition::Quiet => {
                tracing::debug!(context, ?kind, error = %error, "Task failed quietly");
            }
            Disposition::Reconnect => {
                tracing::error!(context, error = %error, "Connection to hub lost");
                self.reconnect();
            }
            Disposition::Halt => {
                tracing::error!(
                    context,
                    error = %error,
                    "Hub rejected the credentials, reconnection stopped"
                );
                self.cancel_dependents();
                let client = Arc::clone(&self.client);
                tokio::spawn(async move { client.halt().await });
            }
            Disposition::Unclassified => {
                tracing::error!(context, error = ?error, "Unclassified error");
            }
        }
        disposition
    }

    /// Runs `work` to completion, handling its error or panic.
    ///
    /// Returns `true` if the work succeeded.
    pub async fn guard<F>(self: &Arc<Self>, context: &str, work: F) -> bool
    where
        F: Future<Output = Result<()>>,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                self.handle(context, &error);
                false
            }
            Err(panic) => {
                tracing::error!(
                    context,
                    panic = panic_message(panic.as_ref()),
                    "Unclassified error (panic)"
                );
                false
            }
        }
    }

    /// Spawns `work` as a supervised background task.
    pub fn spawn<F>(self: &Arc<Self>, context: impl Into<String>, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let this = Arc::clone(self);
        let context = context.into();
        tokio::spawn(async move {
            this.guard(&context, work).await;
        })
    }

    /// Spawns a supervised task that is aborted when the connection is
    /// lost.
    pub fn spawn_dependent<F>(
        self: &Arc<Self>,
        context: impl Into<String>,
        work: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = self.spawn(context, work);
        let mut dependents = self.dependents.lock();
        dependents.retain(|h| !h.is_finished());
        dependents.push(handle.abort_handle());
        handle
    }

    /// Starts a reconnection unless one is already running or the
    /// credentials were rejected.
    ///
    /// Dependent tasks are aborted first. Returns `true` if a new
    /// reconnection was started.
    pub fn reconnect(self: &Arc<Self>) -> bool {
        if self.client.state() == ConnectionState::AuthFailed {
            tracing::debug!("Not reconnecting after authentication failure");
            return false;
        }

        let started = self.reconnecting.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !started {
            tracing::debug!("Reconnection already in progress");
            return false;
        }

        self.reconnects.fetch_add(1, Ordering::AcqRel);
        self.cancel_dependents();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.client.mark_disconnected().await;
            let state = this.client.connect().await;
            this.reconnecting.send_replace(false);
            tracing::info!(?state, "Reconnection finished");

            // Failures raised by the on-connected hooks were ignored while
            // the flag was set.
            if state == ConnectionState::Connected && !this.client.is_connected() {
                tracing::warn!("Connection lost while reconnecting, trying again");
                this.reconnect();
            }
        });
        true
    }

    /// Returns how many reconnections were started.
    #[must_use]
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Returns `true` while a reconnection is running.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        *self.reconnecting.borrow()
    }

    /// Waits until no reconnection is running.
    pub async fn wait_reconnected(&self) {
        let mut rx = self.reconnecting.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Returns the number of dependent tasks still running.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.dependents
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Aborts every dependent task. Used on shutdown.
    pub fn stop_dependents(&self) {
        self.cancel_dependents();
    }

    fn cancel_dependents(&self) {
        let dependents: Vec<_> = self.dependents.lock().drain(..).collect();
        for handle in dependents {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("reconnecting", &self.is_reconnecting())
            .field("reconnects", &self.reconnect_count())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ProtocolError;
    use crate::transport::{HubTransport, MemoryTransport};

    async fn setup() -> (Arc<MemoryTransport>, Arc<Supervisor>) {
        let hub = Arc::new(MemoryTransport::new());
        let client = Arc::new(HubClient::new(Arc::clone(&hub) as Arc<dyn HubTransport>));
        client.connect().await;
        (hub, Supervisor::new(client))
    }

    fn connection_lost() -> Error {
        ProtocolError::ConnectionLost("eof".to_string()).into()
    }

    #[tokio::test]
    async fn concurrent_connection_errors_reconnect_once() {
        let (hub, supervisor) = setup().await;

        let started: Vec<bool> = (0..10).map(|_| supervisor.reconnect()).collect();
        for _ in 0..10 {
            supervisor.handle("dispatch", &connection_lost());
        }
        assert_eq!(started.iter().filter(|s| **s).count(), 1);

        supervisor.wait_reconnected().await;
        assert_eq!(supervisor.reconnect_count(), 1);
        assert_eq!(hub.connect_attempts(), 2);
        assert!(supervisor.client().is_connected());
    }

    #[tokio::test]
    async fn reconnects_again_after_previous_finished() {
        let (hub, supervisor) = setup().await;

        assert!(supervisor.reconnect());
        supervisor.wait_reconnected().await;
        assert!(supervisor.reconnect());
        supervisor.wait_reconnected().await;

        assert_eq!(hub.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn auth_failure_stops_reconnecting() {
        let (hub, supervisor) = setup().await;
        hub.fail_next_connect(ProtocolError::AuthenticationFailed);

        supervisor.handle("subscription", &connection_lost());
        supervisor.wait_reconnected().await;
        assert_eq!(supervisor.client().state(), ConnectionState::AuthFailed);

        for _ in 0..5 {
            assert_eq!(
                supervisor.handle("dispatch", &connection_lost()),
                Disposition::Reconnect
            );
        }
        assert_eq!(supervisor.reconnect_count(), 1);
        assert_eq!(hub.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn auth_error_from_request_halts_client() {
        let (hub, supervisor) = setup().await;

        let disposition =
            supervisor.handle("thermostat", &ProtocolError::AuthenticationFailed.into());
        assert_eq!(disposition, Disposition::Halt);

        let mut state = supervisor.client().watch_state();
        state
            .wait_for(|s| *s == ConnectionState::AuthFailed)
            .await
            .unwrap();
        assert!(!supervisor.reconnect());
        assert_eq!(hub.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn guard_contains_errors_and_panics() {
        let (_hub, supervisor) = setup().await;

        assert!(supervisor.guard("ok", async { Ok(()) }).await);
        assert!(
            !supervisor
                .guard("fails", async { Err(Error::CommandFailed("nope".into())) })
                .await
        );
        assert!(
            !supervisor
                .guard("panics", async {
                    if supervisor.reconnect_count() == 0 {
                        panic!("handler bug");
                    }
                    Ok(())
                })
                .await
        );
        assert_eq!(supervisor.reconnect_count(), 0);
    }

    #[tokio::test]
    async fn quiet_kinds_do_not_reconnect() {
        let (_hub, supervisor) = setup().await;

        for error in [
            Error::NotFoundAgain("sensor.x".into()),
            Error::ServiceTimeout("climate.set_temperature".into()),
            Error::NotFound("sensor.y".into()),
            Error::Cancelled,
        ] {
            supervisor.handle("module", &error);
        }
        assert_eq!(supervisor.reconnect_count(), 0);
    }

    #[tokio::test]
    async fn connection_lost_during_hooks_reconnects_again() {
        let (hub, supervisor) = setup().await;

        let connections = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&supervisor);
        let hook_hub = Arc::clone(&hub);
        let hook_connections = Arc::clone(&connections);
        supervisor.client().on_connected(Arc::new(move || {
            // Only the first reconnection loses its connection right away.
            if hook_connections.fetch_add(1, Ordering::SeqCst) == 0
                && let Some(supervisor) = weak.upgrade()
            {
                hook_hub.drop_connection();
                assert_eq!(
                    supervisor.handle("event subscription", &connection_lost()),
                    Disposition::Reconnect
                );
            }
        }));

        assert!(supervisor.reconnect());
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.reconnect_count() < 2 {
                tokio::task::yield_now().await;
            }
            supervisor.wait_reconnected().await;
        })
        .await
        .unwrap();

        assert_eq!(supervisor.reconnect_count(), 2);
        assert_eq!(hub.connect_attempts(), 3);
        assert_eq!(connections.load(Ordering::SeqCst), 2);
        assert!(supervisor.client().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_aborts_dependents() {
        let (_hub, supervisor) = setup().await;

        let handle = supervisor.spawn_dependent("clock", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        assert_eq!(supervisor.dependent_count(), 1);

        supervisor.reconnect();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
        supervisor.wait_reconnected().await;
        assert_eq!(supervisor.dependent_count(), 0);
    }
}
