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

pub mod table;
pub mod timestamp;

pub use table::RawTable;
pub use timestamp::parse_timestamp;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A numeric column of the input table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    /// Position of the column in the original header
    pub position: usize,
    /// Parsed values, `None` where the cell was empty or not a finite number
    pub values: Vec<Option<f64>>,
}

impl FeatureColumn {
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Validated time series: strictly increasing timestamps plus the numeric
/// feature columns, with the original table kept for output.
#[derive(Debug, Clone)]
pub struct TimeSeriesFrame {
    table: RawTable,
    timestamps: Vec<NaiveDateTime>,
    features: IndexMap<String, FeatureColumn>,
}

impl TimeSeriesFrame {
    pub(crate) const fn new(
        table: RawTable,
        timestamps: Vec<NaiveDateTime>,
        features: IndexMap<String, FeatureColumn>,
    ) -> Self {
        Self {
            table,
            timestamps,
            features,
        }
    }

    #[must_use]
    pub const fn table(&self) -> &RawTable {
        &self.table
    }

    #[must_use]
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    #[must_use]
    pub const fn features(&self) -> &IndexMap<String, FeatureColumn> {
        &self.features
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rows whose timestamp falls inside `window`, as a contiguous index range
    #[must_use]
    pub fn window_rows(&self, window: &TimeWindow) -> Range<usize> {
        let start = window
            .start
            .map_or(0, |s| self.timestamps.partition_point(|ts| *ts < s));
        let end = window.end.map_or(self.timestamps.len(), |e| {
            self.timestamps.partition_point(|ts| *ts <= e)
        });
        start..end.max(start)
    }

    /// Time between the first and last row of `rows`, in hours
    #[must_use]
    pub fn span_hours(&self, rows: &Range<usize>) -> f64 {
        if rows.len() < 2 {
            return 0.0;
        }
        let span = self.timestamps[rows.end - 1] - self.timestamps[rows.start];
        span.num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Inclusive time bounds; a missing side is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    #[must_use]
    pub const fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    /// Window covering the whole frame
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn hourly_frame(hours: usize) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2004, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        let timestamps: Vec<_> = (0..hours)
            .map(|h| start + Duration::hours(h as i64))
            .collect();
        let rows = timestamps
            .iter()
            .map(|ts| vec![ts.to_string()])
            .collect();
        let table = RawTable::new(vec!["Time".to_string()], rows).expect("rectangular");
        TimeSeriesFrame::new(table, timestamps, IndexMap::new())
    }

    #[test]
    fn test_window_rows_inclusive() {
        let frame = hourly_frame(48);
        let t0 = frame.timestamps()[0];

        let window = TimeWindow::new(Some(t0 + Duration::hours(2)), Some(t0 + Duration::hours(5)));
        assert_eq!(frame.window_rows(&window), 2..6);
        assert_eq!(frame.window_rows(&TimeWindow::unbounded()), 0..48);
    }

    #[test]
    fn test_window_between_samples() {
        let frame = hourly_frame(10);
        let t0 = frame.timestamps()[0];

        let window = TimeWindow::new(
            Some(t0 + Duration::minutes(90)),
            Some(t0 + Duration::minutes(100)),
        );
        assert!(frame.window_rows(&window).is_empty());
    }

    #[test]
    fn test_span_hours() {
        let frame = hourly_frame(120);
        assert!((frame.span_hours(&(0..120)) - 119.0).abs() < 1e-9);
        assert!(frame.span_hours(&(3..4)).abs() < f64::EPSILON);
    }
}
