// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Electricity price levels as reported by Tibber.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValueError;

/// Relative price level of the current hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceLevel {
    /// Price at or below zero.
    Free,
    /// Well below the average.
    VeryCheap,
    /// Below the average.
    Cheap,
    /// Around the average.
    Normal,
    /// Above the average.
    Expensive,
    /// Well above the average.
    VeryExpensive,
}

impl PriceLevel {
    /// All levels, cheapest first.
    pub const ALL: [Self; 6] = [
        Self::Free,
        Self::VeryCheap,
        Self::Cheap,
        Self::Normal,
        Self::Expensive,
        Self::VeryExpensive,
    ];

    /// Returns the upper-case name used by the price API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::VeryCheap => "VERY_CHEAP",
            Self::Cheap => "CHEAP",
            Self::Normal => "NORMAL",
            Self::Expensive => "EXPENSIVE",
            Self::VeryExpensive => "VERY_EXPENSIVE",
        }
    }

    /// Combines the reported level with the total price. Any total at or
    /// below zero is [`PriceLevel::Free`].
    #[must_use]
    pub fn with_total(self, total: f64) -> Self {
        if total <= 0.0 { Self::Free } else { self }
    }
}

impl FromStr for PriceLevel {
    type Err = ValueError;

    /// Parses a level name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValueError::InvalidPriceLevel(s.to_string()))
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PriceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
