// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event dispatch to rule modules.
//!
//! Each module describes what it wants to hear about with a
//! [`ModuleRegistration`]: handlers keyed by entity id for state changes and
//! by device id for device events. The [`EventRouter`] then delivers every
//! inbound event to all modules in registration order:
//!
//! 1. the module's generic [`Module::on_event`](crate::modules::Module::on_event)
//! 2. for a state change with both snapshots present, every handler
//!    registered for that entity
//! 3. for a device event with a device id, every handler registered for
//!    that device
//!
//! Each call runs under the [`Supervisor`](crate::supervisor::Supervisor),
//! so one failing handler does not keep the others from running.

mod event_router;
mod registration;

pub use event_router::EventRouter;
pub use registration::{HandlerFuture, ModuleRegistration};
