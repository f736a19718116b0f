// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Home Automations - rule modules driven by Home Assistant events.
//!
//! The controller keeps a websocket connection to a Home Assistant hub,
//! feeds state changes, device events and clock ticks to small stateful
//! rule modules, and sends their service calls back to the hub.
//!
//! # Building Blocks
//!
//! - **Client**: [`client::HubClient`] reconnects with a fixed backoff,
//!   suppresses repeated service calls during their cooldown and reports
//!   unknown entities once ([`Error::NotFound`]), then quietly
//!   ([`Error::NotFoundAgain`])
//! - **Router**: [`router::EventRouter`] delivers each event to the
//!   modules in registration order, by entity id or device id
//! - **Clock**: [`clock::Clock`] reports day, hour, minute and second
//!   boundaries and runs recurring tasks
//! - **Supervisor**: [`supervisor::Supervisor`] classifies every failure
//!   ([`ErrorKind`]) and reconnects at most once at a time
//! - **Modules**: thermostats, motion lights, dimmers, timed lights,
//!   notifications, light replacements, price lights, heartbeat
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use home_automations::config::ConfigStore;
//! use home_automations::controller::Controller;
//!
//! #[tokio::main]
//! async fn main() -> home_automations::Result<()> {
//!     let config = Arc::new(ConfigStore::open("config.yml")?);
//!     Controller::new(config)?.run().await
//! }
//! ```
//!
//! # Testing Modules Without a Hub
//!
//! [`transport::MemoryTransport`] implements the hub contract in memory:
//!
//! ```
//! use std::sync::Arc;
//! use home_automations::client::{HubClient, ServiceCall};
//! use home_automations::event::Snapshot;
//! use home_automations::transport::MemoryTransport;
//!
//! # async fn example() -> home_automations::Result<()> {
//! let hub = Arc::new(MemoryTransport::new());
//! hub.set_state(Snapshot::new("light.hall", "off"));
//!
//! let client = HubClient::new(hub.clone());
//! client.connect().await;
//! client
//!     .call_service(ServiceCall::new("light", "turn_on").target_entity("light.hall"))
//!     .await?;
//! assert!(hub.state("light.hall").unwrap().is_on());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod logging;
pub mod modules;
pub mod router;
pub mod status;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use error::{
    ConfigError, Disposition, Error, ErrorKind, ParseError, ProtocolError, Result, ValueError,
};
