// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Websocket transport for the hub's `/api/websocket` endpoint.
//!
//! The protocol is JSON over a single websocket:
//!
//! 1. the hub sends `auth_required`
//! 2. the client answers with `auth` carrying the access token
//! 3. the hub replies `auth_ok` or `auth_invalid`
//!
//! Afterwards every request carries a numeric `id` and is answered by a
//! `result` frame with the same id. Events for a subscription arrive as
//! `event` frames tagged with the id of the `subscribe_events` request.
//!
//! A reader task routes incoming frames to waiting requests and
//! subscriptions; a writer task owns the sending half of the socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{EVENT_CHANNEL_CAPACITY, HubTransport};
use crate::client::ServiceCall;
use crate::error::ProtocolError;
use crate::event::{Event, RawEvent, Snapshot};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<Value, ProtocolError>;

/// Hub error code for unknown entities and services.
const NOT_FOUND_CODE: &str = "not_found";

/// Connection settings for [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    url: String,
    token: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl WebSocketConfig {
    /// Creates settings for the hub at `url` (e.g. `http://hub.local:8123`)
    /// authenticating with a long-lived access token.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the timeout for opening and authenticating (default: 10 seconds).
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the timeout for a single request (default: 30 seconds).
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the websocket endpoint derived from the configured URL.
    ///
    /// `http`/`https` URLs are mapped to `ws`/`wss` and `/api/websocket` is
    /// appended unless already present.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] for any other scheme.
    pub fn endpoint(&self) -> Result<String, ProtocolError> {
        let base = self.url.trim().trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ProtocolError::InvalidAddress(self.url.clone()));
        };

        if base.ends_with("/api/websocket") {
            Ok(base)
        } else {
            Ok(format!("{base}/api/websocket"))
        }
    }
}

/// Hub transport over the websocket API.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    session: RwLock<Option<Arc<Session>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl WebSocketTransport {
    /// Creates a disconnected transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn session(&self) -> Result<Arc<Session>, ProtocolError> {
        self.session
            .read()
            .as_ref()
            .filter(|s| s.is_alive())
            .cloned()
            .ok_or(ProtocolError::NotConnected)
    }

    async fn handshake(&self, stream: &mut WsStream) -> Result<(), ProtocolError> {
        let greeting = next_frame(stream).await?;
        if greeting.kind != "auth_required" {
            return Err(ProtocolError::HandshakeFailed(format!(
                "expected auth_required, got {}",
                greeting.kind
            )));
        }

        let auth = serde_json::json!({"type": "auth", "access_token": self.config.token});
        stream.send(Message::Text(auth.to_string())).await?;

        let reply = next_frame(stream).await?;
        match reply.kind.as_str() {
            "auth_ok" => Ok(()),
            "auth_invalid" => {
                tracing::debug!(message = ?reply.message, "Hub rejected access token");
                Err(ProtocolError::AuthenticationFailed)
            }
            other => Err(ProtocolError::HandshakeFailed(format!(
                "unexpected reply to auth: {other}"
            ))),
        }
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), ProtocolError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let endpoint = self.config.endpoint()?;
        let timeout = self.config.connect_timeout;
        tracing::debug!(%endpoint, "Connecting to hub");

        let mut stream = match tokio::time::timeout(timeout, connect_async(endpoint.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(ProtocolError::CannotConnect(e.to_string())),
            Err(_) => {
                return Err(ProtocolError::CannotConnect(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        match tokio::time::timeout(timeout, self.handshake(&mut stream)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProtocolError::HandshakeFailed(
                    "timed out waiting for authentication".to_string(),
                ));
            }
        }

        let (sink, source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(outbound_tx));

        let writer = tokio::spawn(write_loop(sink, outbound_rx, Arc::clone(&session)));
        let reader = tokio::spawn(read_loop(source, Arc::clone(&session)));
        session.tasks.lock().extend([writer, reader]);

        if let Some(previous) = self.session.write().replace(session) {
            previous.shutdown("replaced by new connection");
        }

        tracing::info!(%endpoint, "Connected to hub");
        Ok(())
    }

    async fn disconnect(&self) {
        let previous = self.session.write().take();
        if let Some(session) = previous {
            session.shutdown("disconnected");
            tracing::debug!("Disconnected from hub");
        }
    }

    fn is_connected(&self) -> bool {
        self.session.read().as_ref().is_some_and(|s| s.is_alive())
    }

    async fn get_state(&self, entity_id: &str) -> Result<Snapshot, ProtocolError> {
        let session = self.session()?;
        let states = session
            .request(command("get_states"), self.config.request_timeout)
            .await?;

        let Value::Array(states) = states else {
            return Err(ProtocolError::InvalidPayload(
                "get_states did not return a list".to_string(),
            ));
        };

        let state = states
            .into_iter()
            .find(|s| s.get("entity_id").and_then(Value::as_str) == Some(entity_id))
            .ok_or_else(|| ProtocolError::NotFound(entity_id.to_string()))?;

        serde_json::from_value(state).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }

    async fn call_service(&self, call: &ServiceCall) -> Result<(), ProtocolError> {
        let session = self.session()?;

        let mut payload = command("call_service");
        payload.insert("domain".to_string(), call.domain().into());
        payload.insert("service".to_string(), call.service().into());
        if let Some(data) = call.data() {
            payload.insert("service_data".to_string(), Value::Object(data.clone()));
        }
        if let Some(target) = call.target() {
            payload.insert("target".to_string(), Value::Object(target.clone()));
        }

        session
            .request(payload, self.config.request_timeout)
            .await
            .map(|_| ())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<Event>, ProtocolError> {
        let session = self.session()?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let id = session.next_id();
        session.subscriptions.lock().insert(id, tx);

        if let Err(e) = session
            .request_with_id(id, command("subscribe_events"), self.config.request_timeout)
            .await
        {
            session.subscriptions.lock().remove(&id);
            return Err(e);
        }

        tracing::debug!(subscription = id, "Subscribed to hub events");
        Ok(rx)
    }
}

// ============================================================================
// Session
// ============================================================================

/// State of one authenticated connection.
struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    subscriptions: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    alive: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    fn new(outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, payload: Map<String, Value>, timeout: Duration) -> Reply {
        self.request_with_id(self.next_id(), payload, timeout).await
    }

    async fn request_with_id(
        &self,
        id: u64,
        mut payload: Map<String, Value>,
        timeout: Duration,
    ) -> Reply {
        payload.insert("id".to_string(), id.into());
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let text = Value::Object(payload).to_string();
        if self.outbound.send(Message::Text(text)).is_err() {
            self.pending.lock().remove(&id);
            return Err(ProtocolError::ConnectionLost(
                "writer task stopped".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ProtocolError::ConnectionLost(
                "connection closed before reply".to_string(),
            )),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(ProtocolError::Timeout(timeout))
            }
        }
    }

    async fn route(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable hub message");
                return;
            }
        };

        match (frame.kind.as_str(), frame.id) {
            ("result", Some(id)) => {
                let reply = if frame.success == Some(true) {
                    Ok(frame.result)
                } else {
                    Err(rejection(frame.error))
                };
                let waiter = self.pending.lock().remove(&id);
                if let Some(waiter) = waiter {
                    let _ = waiter.send(reply);
                }
            }
            ("event", Some(id)) => {
                let Some(raw) = frame.event else {
                    return;
                };
                let sender = self.subscriptions.lock().get(&id).cloned();
                if let Some(sender) = sender
                    && sender.send(Event::from_raw(raw)).await.is_err()
                {
                    tracing::debug!(subscription = id, "Event receiver dropped");
                    self.subscriptions.lock().remove(&id);
                }
            }
            ("pong", _) => {}
            (kind, _) => tracing::debug!(kind, "Ignoring hub message"),
        }
    }

    /// Marks the session dead, failing pending requests and closing
    /// subscription channels.
    fn shutdown(&self, reason: &str) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, waiter) in pending {
            let _ = waiter.send(Err(ProtocolError::ConnectionLost(reason.to_string())));
        }
        self.subscriptions.lock().clear();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::debug!(reason, "Hub session closed");
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    session: Arc<Session>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "Failed to write to hub");
            break;
        }
    }
    let _ = sink.close().await;
    session.shutdown("write failed");
}

async fn read_loop(mut source: SplitStream<WsStream>, session: Arc<Session>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => session.route(&text).await,
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "Hub closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Hub connection error");
                break;
            }
        }
    }
    session.shutdown("connection closed");
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorPayload>,
    #[serde(default)]
    event: Option<RawEvent>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    code: String,
    #[serde(default)]
    message: String,
}

fn command(kind: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("type".to_string(), kind.into());
    payload
}

fn rejection(error: Option<ErrorPayload>) -> ProtocolError {
    match error {
        Some(error) if error.code == NOT_FOUND_CODE => ProtocolError::NotFound(error.message),
        Some(error) => ProtocolError::Rejected {
            code: error.code,
            message: error.message,
        },
        None => ProtocolError::Rejected {
            code: "unknown_error".to_string(),
            message: "request failed without details".to_string(),
        },
    }
}

async fn next_frame(stream: &mut WsStream) -> Result<Frame, ProtocolError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ProtocolError::ConnectionLost(
                    "closed during authentication".to_string(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_http_url() {
        let config = WebSocketConfig::new("http://hub.local:8123/", "t");
        assert_eq!(
            config.endpoint().unwrap(),
            "ws://hub.local:8123/api/websocket"
        );

        let config = WebSocketConfig::new("https://hub.example.com", "t");
        assert_eq!(
            config.endpoint().unwrap(),
            "wss://hub.example.com/api/websocket"
        );
    }

    #[test]
    fn endpoint_keeps_websocket_url() {
        let config = WebSocketConfig::new("ws://127.0.0.1:9000/api/websocket", "t");
        assert_eq!(
            config.endpoint().unwrap(),
            "ws://127.0.0.1:9000/api/websocket"
        );
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        let config = WebSocketConfig::new("mqtt://hub", "t");
        assert!(matches!(
            config.endpoint(),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejection_maps_not_found() {
        let err = rejection(Some(ErrorPayload {
            code: "not_found".to_string(),
            message: "Service light.explode not found.".to_string(),
        }));
        assert!(matches!(err, ProtocolError::NotFound(_)));

        let err = rejection(Some(ErrorPayload {
            code: "home_assistant_error".to_string(),
            message: "boom".to_string(),
        }));
        assert!(matches!(err, ProtocolError::Rejected { ref code, .. } if code == "home_assistant_error"));

        assert!(matches!(rejection(None), ProtocolError::Rejected { .. }));
    }

    #[test]
    fn parses_event_frame() {
        let frame: Frame = serde_json::from_str(
            r#"{"id": 3, "type": "event", "event": {"event_type": "zha_event",
                "data": {"device_ieee": "aa:bb", "command": "on"}, "origin": "LOCAL"}}"#,
        )
        .unwrap();
        assert_eq!(frame.kind, "event");
        assert_eq!(frame.id, Some(3));
        let event = Event::from_raw(frame.event.unwrap());
        assert_eq!(event.device_id(), Some("aa:bb"));
    }

    #[test]
    fn config_builder() {
        let config = WebSocketConfig::new("http://hub", "secret")
            .with_connect_timeout(Duration::from_secs(3))
            .with_request_timeout(Duration::from_secs(7));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
    }
}
