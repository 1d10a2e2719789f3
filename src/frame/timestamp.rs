// SignalCrab - GPL-3.0-or-later
// This file is part of SignalCrab.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// SignalCrab is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SignalCrab is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with SignalCrab.  If not, see <https://www.gnu.org/licenses/>.

//! Timestamp parsing for the time column.
//!
//! Timestamps are kept timezone-naive: a dataset is assumed to be recorded in a
//! single clock, and offsets in RFC 3339 input are folded into UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a single timestamp cell. Returns `None` if no known format matches.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid date")
    }

    #[test]
    fn test_iso_formats() {
        let expected = ymd_hm(2004, 1, 1, 13, 30);
        assert_eq!(parse_timestamp("2004-01-01 13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2004-01-01T13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2004-01-01 13:30"), Some(expected));
        assert_eq!(parse_timestamp("  2004-01-01 13:30:00 "), Some(expected));
    }

    #[test]
    fn test_us_format() {
        assert_eq!(
            parse_timestamp("1/5/2004 23:59"),
            Some(ymd_hm(2004, 1, 5, 23, 59))
        );
    }

    #[test]
    fn test_rfc3339_folds_offset() {
        let ts = parse_timestamp("2004-01-01T13:30:00+02:00").expect("parses");
        assert_eq!(ts.hour(), 11);
    }

    #[test]
    fn test_date_only_is_midnight() {
        assert_eq!(parse_timestamp("2004-01-19"), Some(ymd_hm(2004, 1, 19, 0, 0)));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("12.5"), None);
    }
}
