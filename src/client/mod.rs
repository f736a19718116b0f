// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection manager for the hub.
//!
//! [`HubClient`] owns the single connection to the hub and is shared by all
//! modules. It layers three behaviours on top of a
//! [`HubTransport`](crate::transport::HubTransport):
//!
//! - connecting with a fixed retry delay, stopping for good on rejected
//!   credentials
//! - distinguishing the first and repeated "not found" answers per entity
//! - suppressing identical service calls while a cooldown is running

mod hub_client;
mod service_call;

pub use hub_client::{ConnectedHook, ConnectionState, DEFAULT_RETRY_DELAY, HubClient};
pub use service_call::{ServiceCall, ServiceFingerprint};
