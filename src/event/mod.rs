// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Events and entity state snapshots received from the hub.
//!
//! The hub pushes every event over a single subscription. Each raw event is
//! converted into one of three [`Event`] variants:
//!
//! - [`Event::StateChanged`] - an entity moved from one state to another
//! - [`Event::Device`] - a device (for example a Zigbee remote) sent a command
//! - [`Event::Generic`] - anything else, kept with its raw payload
//!
//! # Examples
//!
//! ```
//! use home_automations::event::{Event, Snapshot};
//!
//! let event = Event::state_changed(
//!     "binary_sensor.hall_motion",
//!     Some(Snapshot::new("binary_sensor.hall_motion", "off")),
//!     Some(Snapshot::new("binary_sensor.hall_motion", "on")),
//! );
//! assert_eq!(event.entity_id(), Some("binary_sensor.hall_motion"));
//! ```

mod hub_event;
mod snapshot;

pub use hub_event::{DEVICE_EVENT, Event, RawEvent, STATE_CHANGED};
pub use snapshot::{Context, Snapshot};
