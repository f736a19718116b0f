// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the home automations controller.
//!
//! Every failure surfaced to the rest of the controller is an [`Error`].
//! Failures of the hub connection start out as a [`ProtocolError`] and are
//! converted at the [`HubClient`](crate::client::HubClient) boundary.
//!
//! Errors are grouped into a closed taxonomy through [`Error::kind`]. Each
//! [`ErrorKind`] maps to exactly one [`Disposition`], which the
//! [`Supervisor`](crate::supervisor::Supervisor) uses to decide whether an
//! error is logged, silenced, or turned into a reconnection.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for the controller.
#[derive(Debug, Error)]
pub enum Error {
    /// An entity or service was not known to the hub (first occurrence).
    #[error("not found: {0}")]
    NotFound(String),

    /// The same entity or service was reported unknown again.
    #[error("still not found: {0}")]
    NotFoundAgain(String),

    /// A service call was suppressed because its cooldown has not elapsed.
    #[error("service call {0} suppressed by cooldown")]
    ServiceTimeout(String),

    /// A task was cancelled before it could complete.
    ///
    /// Part of the [`ErrorKind`] taxonomy for callers that await their own
    /// task handles. The crate itself never raises it: superseded delayed
    /// actions and aborted dependent tasks are dropped without being
    /// awaited, so their cancellation never reaches the supervisor.
    #[error("operation cancelled")]
    Cancelled,

    /// The hub accepted the request but reported a failure.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Error raised by the hub connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while loading or persisting configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error raised by an outbound HTTP request.
    #[cfg(feature = "http")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by a hub transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The hub could not be reached.
    #[error("cannot connect: {0}")]
    CannotConnect(String),

    /// The connection was established but the handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The hub rejected the access token.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// No connection is currently established.
    #[error("not connected")]
    NotConnected,

    /// An established connection was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The hub did not answer a request in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The hub reported the requested entity or service as unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// The hub rejected a request.
    #[error("request rejected ({code}): {message}")]
    Rejected {
        /// Error code reported by the hub.
        code: String,
        /// Human-readable error message.
        message: String,
    },

    /// The hub sent a payload that could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The configured hub address is not usable.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Low-level websocket failure.
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for ProtocolError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A time of day could not be parsed.
    #[error("invalid time of day: {0:?}")]
    InvalidTimeOfDay(String),

    /// A schedule has no entries.
    #[error("schedule has no entries")]
    EmptySchedule,

    /// A recurring task interval is shorter than one second.
    #[error("interval {0:?} is shorter than one second")]
    IntervalTooShort(Duration),

    /// A hex color string is malformed.
    #[error("invalid hex color: {0:?}")]
    InvalidHexColor(String),

    /// A timezone name is not a known IANA zone.
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    /// A price level name is not recognised.
    #[error("unknown price level: {0}")]
    InvalidPriceLevel(String),
}

/// Errors that occur while parsing payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field: {0}")]
    MissingField(String),

    /// The payload has an unexpected shape.
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),
}

/// Errors related to the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration existed; a default one was written at the path.
    #[error("created default configuration at {}", .0.display())]
    CreatedDefault(PathBuf),

    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for the configuration schema.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),

    /// A value is syntactically valid but semantically wrong.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The logging backend could not be initialised.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

// ============================================================================
// Classification
// ============================================================================

/// Closed taxonomy every [`Error`] is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity or service unknown, first occurrence.
    NotFound,
    /// Entity or service unknown, repeated.
    NotFoundAgain,
    /// Service call suppressed by its cooldown.
    ServiceTimeout,
    /// Task cancelled.
    Cancelled,
    /// The hub reported a command failure.
    CommandFailed,
    /// The connection is gone or was never established.
    ConnectionLost,
    /// The hub rejected the credentials.
    AuthFailed,
    /// Anything else.
    Unclassified,
}

/// What the supervisor does with an error of a given [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Log at error level and continue.
    Report,
    /// Swallow silently (debug level only).
    Quiet,
    /// Cancel connection-dependent work and reconnect once.
    Reconnect,
    /// Log and stop reconnecting for good.
    Halt,
    /// Log at error level with full detail and continue.
    Unclassified,
}

impl ErrorKind {
    /// Returns how the supervisor reacts to this kind of error.
    #[must_use]
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::NotFound | Self::Cancelled | Self::CommandFailed => Disposition::Report,
            Self::NotFoundAgain | Self::ServiceTimeout => Disposition::Quiet,
            Self::ConnectionLost => Disposition::Reconnect,
            Self::AuthFailed => Disposition::Halt,
            Self::Unclassified => Disposition::Unclassified,
        }
    }
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotFoundAgain(_) => ErrorKind::NotFoundAgain,
            Self::ServiceTimeout(_) => ErrorKind::ServiceTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CommandFailed(_) => ErrorKind::CommandFailed,
            Self::Protocol(err) => err.kind(),
            Self::Value(_) | Self::Parse(_) | Self::Config(_) => ErrorKind::Unclassified,
            #[cfg(feature = "http")]
            Self::Http(_) => ErrorKind::Unclassified,
        }
    }
}

impl ProtocolError {
    /// Classifies this transport error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed => ErrorKind::AuthFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected { .. } => ErrorKind::CommandFailed,
            Self::CannotConnect(_)
            | Self::HandshakeFailed(_)
            | Self::NotConnected
            | Self::ConnectionLost(_)
            | Self::Timeout(_)
            | Self::WebSocket(_) => ErrorKind::ConnectionLost,
            Self::InvalidPayload(_) | Self::InvalidAddress(_) => ErrorKind::Unclassified,
        }
    }
}

/// A specialized `Result` type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::NotFound("light.kitchen".to_string());
        assert_eq!(err.to_string(), "not found: light.kitchen");

        let err = Error::ServiceTimeout("climate.set_temperature".to_string());
        assert_eq!(
            err.to_string(),
            "service call climate.set_temperature suppressed by cooldown"
        );
    }

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::Rejected {
            code: "invalid_format".to_string(),
            message: "bad data".to_string(),
        };
        assert_eq!(err.to_string(), "request rejected (invalid_format): bad data");
    }

    #[test]
    fn value_error_conversion() {
        let err: Error = ValueError::EmptySchedule.into();
        assert!(matches!(err, Error::Value(ValueError::EmptySchedule)));
        assert_eq!(err.kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn connection_family_reconnects() {
        for err in [
            ProtocolError::CannotConnect("refused".into()),
            ProtocolError::HandshakeFailed("no auth_required".into()),
            ProtocolError::NotConnected,
            ProtocolError::ConnectionLost("eof".into()),
            ProtocolError::Timeout(Duration::from_secs(10)),
        ] {
            let err = Error::from(err);
            assert_eq!(err.kind(), ErrorKind::ConnectionLost, "{err}");
            assert_eq!(err.kind().disposition(), Disposition::Reconnect);
        }
    }

    #[test]
    fn auth_failure_halts() {
        let err = Error::from(ProtocolError::AuthenticationFailed);
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
        assert_eq!(err.kind().disposition(), Disposition::Halt);
    }

    #[test]
    fn cancellation_is_reported_and_not_fatal() {
        let err = Error::Cancelled;
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.kind().disposition(), Disposition::Report);
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn disposition_table() {
        assert_eq!(ErrorKind::NotFound.disposition(), Disposition::Report);
        assert_eq!(ErrorKind::NotFoundAgain.disposition(), Disposition::Quiet);
        assert_eq!(ErrorKind::ServiceTimeout.disposition(), Disposition::Quiet);
        assert_eq!(ErrorKind::Cancelled.disposition(), Disposition::Report);
        assert_eq!(ErrorKind::CommandFailed.disposition(), Disposition::Report);
        assert_eq!(
            ErrorKind::Unclassified.disposition(),
            Disposition::Unclassified
        );
    }

    #[test]
    fn rejected_request_is_command_failure() {
        let err = Error::from(ProtocolError::Rejected {
            code: "home_assistant_error".into(),
            message: "boom".into(),
        });
        assert_eq!(err.kind(), ErrorKind::CommandFailed);
    }
}
