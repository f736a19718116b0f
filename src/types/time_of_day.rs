// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-of-day parsing for schedule keys and time windows.

use chrono::NaiveTime;

use crate::error::ValueError;

/// Parses a time of day written as `"H"`, `"H:M"` or `"H:M:S"`.
///
/// Components may omit leading zeros (`"6:5"` is 06:05:00).
///
/// # Errors
///
/// Returns [`ValueError::InvalidTimeOfDay`] if the string has more than
/// three components, a component is not a number, or the resulting time
/// does not exist.
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use home_automations::types::parse_time_of_day;
///
/// assert_eq!(parse_time_of_day("7").unwrap(), NaiveTime::from_hms_opt(7, 0, 0).unwrap());
/// assert_eq!(parse_time_of_day("22:30").unwrap(), NaiveTime::from_hms_opt(22, 30, 0).unwrap());
/// assert!(parse_time_of_day("25:00").is_err());
/// ```
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ValueError> {
    let invalid = || ValueError::InvalidTimeOfDay(s.to_string());

    let mut parts = [0_u32; 3];
    let mut count = 0;
    for part in s.trim().split(':') {
        if count == parts.len() {
            return Err(invalid());
        }
        parts[count] = part.trim().parse().map_err(|_| invalid())?;
        count += 1;
    }

    NaiveTime::from_hms_opt(parts[0], parts[1], parts[2]).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn parses_all_three_forms() {
        assert_eq!(parse_time_of_day("0").unwrap(), hms(0, 0, 0));
        assert_eq!(parse_time_of_day("06:00").unwrap(), hms(6, 0, 0));
        assert_eq!(parse_time_of_day("23:59:59").unwrap(), hms(23, 59, 59));
        assert_eq!(parse_time_of_day(" 6:5 ").unwrap(), hms(6, 5, 0));
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "noon", "12:", "12:00:00:00", "24:00", "12:60", "-1"] {
            assert!(parse_time_of_day(input).is_err(), "{input:?} should fail");
        }
    }
}
