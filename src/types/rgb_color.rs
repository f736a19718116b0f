// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RGB color type parsed from the hex strings used in configuration files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValueError;

/// RGB color with 8-bit channels.
///
/// Serializes to and from `#RRGGBB` strings so that colors can be written
/// directly in the YAML configuration.
///
/// # Examples
///
/// ```
/// use home_automations::types::RgbColor;
///
/// let color: RgbColor = "#FF5733".parse().unwrap();
/// assert_eq!(color.to_array(), [255, 87, 51]);
/// assert_eq!(color.to_string(), "#FF5733");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgbColor {
    red: u8,
    green: u8,
    blue: u8,
}

impl RgbColor {
    /// Creates a new RGB color.
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parses a color from `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidHexColor`] if the string is not one of
    /// the accepted forms.
    pub fn from_hex(hex: &str) -> Result<Self, ValueError> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return Err(ValueError::InvalidHexColor(hex.to_string()));
        }

        let channel = |s: &str| {
            u8::from_str_radix(s, 16).map_err(|_| ValueError::InvalidHexColor(hex.to_string()))
        };

        match digits.len() {
            // Each short digit expands to a doubled pair: "F" -> "FF".
            3 => Ok(Self::new(
                channel(&digits[0..1])? * 17,
                channel(&digits[1..2])? * 17,
                channel(&digits[2..3])? * 17,
            )),
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            _ => Err(ValueError::InvalidHexColor(hex.to_string())),
        }
    }

    /// Returns the channels as `[red, green, blue]`.
    #[must_use]
    pub const fn to_array(self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

impl FromStr for RgbColor {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl Serialize for RgbColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RgbColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_forms() {
        assert_eq!(RgbColor::from_hex("#00FF00").unwrap(), RgbColor::new(0, 255, 0));
        assert_eq!(RgbColor::from_hex("ff8000").unwrap(), RgbColor::new(255, 128, 0));
        assert_eq!(RgbColor::from_hex("#F00").unwrap(), RgbColor::new(255, 0, 0));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(RgbColor::from_hex("#GG0000").is_err());
        assert!(RgbColor::from_hex("#12345").is_err());
        assert!(RgbColor::from_hex("").is_err());
        assert!(RgbColor::from_hex("#ÄÄÄ").is_err());
    }

    #[test]
    fn displays_with_hash() {
        assert_eq!(RgbColor::new(1, 171, 255).to_string(), "#01ABFF");
    }

    #[test]
    fn deserializes_from_yaml_string() {
        let color: RgbColor = serde_yaml::from_str("'#0000ff'").unwrap();
        assert_eq!(color.to_array(), [0, 0, 255]);

        let err = serde_yaml::from_str::<RgbColor>("'blue'");
        assert!(err.is_err());
    }
}
