// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the controller and its rule modules.
//!
//! # Types
//!
//! - [`Schedule`] - Time-of-day keyed values with wrap-around resolution
//! - [`RgbColor`] - 8-bit RGB color parsed from hex strings
//! - [`PriceLevel`] - Electricity price level
//!
//! # Functions
//!
//! - [`parse_time_of_day`] - Parse `"H"`, `"H:M"` and `"H:M:S"` strings

mod price_level;
mod rgb_color;
mod schedule;
mod time_of_day;

pub use price_level::PriceLevel;
pub use rgb_color::RgbColor;
pub use schedule::Schedule;
pub use time_of_day::parse_time_of_day;
