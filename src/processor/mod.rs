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

//! Validation, cleaning, windowing and scaling of the input table.

pub mod scaler;

pub use scaler::{FeatureMatrix, FeatureScaler};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{parse_timestamp, FeatureColumn, RawTable, TimeSeriesFrame, TimeWindow};
use crate::pipeline::PipelineWarning;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;

/// Numeric columns after forward/backward filling. Columns without a single
/// value are not included.
pub type FilledColumns = IndexMap<String, Vec<f64>>;

/// Scaled model inputs for one run
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Modeled features, in column order
    pub features: Vec<String>,
    /// Features excluded from modeling
    pub dropped_features: Vec<String>,
    pub training: FeatureMatrix,
    pub analysis: FeatureMatrix,
    pub training_rows: Range<usize>,
    pub analysis_rows: Range<usize>,
    pub warnings: Vec<PipelineWarning>,
}

pub struct DataProcessor {
    timestamp_column: String,
    min_training_hours: u32,
}

impl DataProcessor {
    #[must_use]
    pub fn new(timestamp_column: impl Into<String>, min_training_hours: u32) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            min_training_hours,
        }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.timestamp_column.clone(), config.min_training_hours)
    }

    /// Check the table's shape and build the typed frame.
    ///
    /// Fails if the timestamp column is missing, any timestamp cannot be parsed,
    /// timestamps are not strictly increasing, or no numeric column exists.
    pub fn validate(
        &self,
        table: RawTable,
        warnings: &mut Vec<PipelineWarning>,
    ) -> Result<TimeSeriesFrame> {
        let ts_pos = table.column_index(&self.timestamp_column).ok_or_else(|| {
            PipelineError::Schema(format!(
                "timestamp column '{}' not found",
                self.timestamp_column
            ))
        })?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = table.headers().iter().find(|h| !seen.insert(h.as_str())) {
            return Err(PipelineError::Schema(format!(
                "column name '{duplicate}' appears more than once"
            )));
        }

        if table.is_empty() {
            return Err(PipelineError::Schema("table has no rows".to_string()));
        }

        let mut timestamps = Vec::with_capacity(table.len());
        for (row, cell) in table.column(ts_pos).enumerate() {
            let ts = parse_timestamp(cell).ok_or_else(|| {
                PipelineError::Schema(format!(
                    "cannot parse timestamp '{cell}' in row {}",
                    row + 1
                ))
            })?;
            if let Some(prev) = timestamps.last() {
                if ts <= *prev {
                    return Err(PipelineError::Schema(format!(
                        "timestamps must be strictly increasing, row {} ({ts}) follows {prev}",
                        row + 1
                    )));
                }
            }
            timestamps.push(ts);
        }

        let mut features = IndexMap::new();
        for (position, header) in table.headers().iter().enumerate() {
            if position == ts_pos {
                continue;
            }
            match parse_numeric_column(table.column(position)) {
                Some(values) => {
                    features.insert(header.clone(), FeatureColumn { position, values });
                }
                None => {
                    tracing::warn!("Column '{header}' is not numeric, passing it through");
                    warnings.push(PipelineWarning::NonNumericColumn {
                        column: header.clone(),
                    });
                }
            }
        }

        if features.is_empty() {
            return Err(PipelineError::Schema(
                "no numeric feature columns found".to_string(),
            ));
        }

        if let Some(warning) = spacing_warning(&timestamps) {
            tracing::warn!("{warning}");
            warnings.push(warning);
        }

        tracing::info!(
            "Validated {} rows with {} numeric features",
            timestamps.len(),
            features.len()
        );
        Ok(TimeSeriesFrame::new(table, timestamps, features))
    }

    /// Forward-fill then backward-fill each feature over the full frame
    #[must_use]
    pub fn fill_missing(
        &self,
        frame: &TimeSeriesFrame,
        warnings: &mut Vec<PipelineWarning>,
    ) -> FilledColumns {
        let mut filled = IndexMap::with_capacity(frame.features().len());

        for (name, column) in frame.features() {
            let missing = column.missing_count();
            match fill_forward_backward(&column.values) {
                Some(values) => {
                    if missing > 0 {
                        tracing::info!("Filling {missing} missing values in {name}");
                        warnings.push(PipelineWarning::MissingValuesFilled {
                            feature: name.clone(),
                            count: missing,
                        });
                    }
                    filled.insert(name.clone(), values);
                }
                None => {
                    tracing::warn!("Feature {name} has no values, excluding it");
                    warnings.push(PipelineWarning::DegenerateFeature {
                        feature: name.clone(),
                        reason: "column has no values".to_string(),
                    });
                }
            }
        }

        filled
    }

    /// Resolve the windows, drop constant features, fit the scaler on the
    /// training window and scale both windows.
    pub fn split(
        &self,
        frame: &TimeSeriesFrame,
        filled: &FilledColumns,
        training_window: &TimeWindow,
        analysis_window: &TimeWindow,
        warnings: &mut Vec<PipelineWarning>,
    ) -> Result<PreparedData> {
        let training_rows = frame.window_rows(training_window);
        let analysis_rows = frame.window_rows(analysis_window);

        let training_hours = frame.span_hours(&training_rows);
        if training_hours < f64::from(self.min_training_hours) {
            return Err(PipelineError::InsufficientData {
                actual_hours: training_hours,
                required_hours: self.min_training_hours,
            });
        }
        if analysis_rows.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "analysis window selects no rows".to_string(),
            ));
        }

        let mut dropped_features: Vec<String> = frame
            .features()
            .keys()
            .filter(|name| !filled.contains_key(*name))
            .cloned()
            .collect();

        let mut columns: Vec<(&str, &[f64])> = Vec::with_capacity(filled.len());
        for (name, values) in filled {
            if is_constant(&values[training_rows.clone()]) {
                tracing::warn!("Removing constant feature: {name}");
                warnings.push(PipelineWarning::DegenerateFeature {
                    feature: name.clone(),
                    reason: "constant in training window".to_string(),
                });
                dropped_features.push(name.clone());
            } else {
                columns.push((name.as_str(), values.as_slice()));
            }
        }

        if columns.is_empty() {
            return Err(PipelineError::Schema(
                "no modelable feature columns remain after cleaning".to_string(),
            ));
        }

        let scaler = FeatureScaler::fit(&columns, &training_rows);
        let training = scaler.transform(&columns, &training_rows);
        let analysis = scaler.transform(&columns, &analysis_rows);

        tracing::info!(
            "Training: {} rows ({training_hours:.1} hours), analysis: {} rows, {} features",
            training_rows.len(),
            analysis_rows.len(),
            columns.len()
        );

        Ok(PreparedData {
            features: scaler.features,
            dropped_features,
            training,
            analysis,
            training_rows,
            analysis_rows,
            warnings: Vec::new(),
        })
    }

    /// Fill, split and scale a validated frame in one go.
    ///
    /// Returns the prepared data together with the filled columns needed to
    /// emit formerly-missing cells.
    pub fn prepare(
        &self,
        frame: &TimeSeriesFrame,
        training_window: &TimeWindow,
        analysis_window: &TimeWindow,
    ) -> Result<(PreparedData, FilledColumns)> {
        let mut warnings = Vec::new();
        let filled = self.fill_missing(frame, &mut warnings);
        let mut prepared = self.split(
            frame,
            &filled,
            training_window,
            analysis_window,
            &mut warnings,
        )?;
        prepared.warnings = warnings;
        Ok((prepared, filled))
    }
}

/// Cells that count as missing rather than as text
fn is_missing_marker(cell: &str) -> bool {
    cell.is_empty()
        || ["nan", "na", "n/a", "null", "none"]
            .iter()
            .any(|m| cell.eq_ignore_ascii_case(m))
}

/// Parse a column as numbers. Returns `None` if any non-missing cell is text.
fn parse_numeric_column<'a>(cells: impl Iterator<Item = &'a str>) -> Option<Vec<Option<f64>>> {
    cells
        .map(|cell| {
            let cell = cell.trim();
            if is_missing_marker(cell) {
                return Some(None);
            }
            cell.parse::<f64>()
                .ok()
                .map(|v| if v.is_finite() { Some(v) } else { None })
        })
        .collect()
}

/// Forward-fill, then backward-fill. `None` if the column has no value at all.
fn fill_forward_backward(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|v| {
                if let Some(v) = v {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

fn spacing_warning(timestamps: &[chrono::NaiveDateTime]) -> Option<PipelineWarning> {
    let intervals: BTreeSet<i64> = timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds())
        .collect();

    if intervals.len() <= 1 {
        return None;
    }
    Some(PipelineWarning::IrregularSpacing {
        distinct_intervals: intervals.len(),
        min_interval_secs: intervals.first().copied().unwrap_or_default(),
        max_interval_secs: intervals.last().copied().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2004, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn table(headers: &[&str], rows: Vec<Vec<String>>) -> RawTable {
        RawTable::new(headers.iter().map(|h| (*h).to_string()).collect(), rows)
            .expect("rectangular")
    }

    /// `hours` hourly rows with columns Time, a (ramp), b (sawtooth), c (constant)
    fn hourly_table(hours: usize) -> RawTable {
        let rows = (0..hours)
            .map(|h| {
                let ts = start() + Duration::hours(h as i64);
                vec![
                    ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                    format!("{}", h as f64 * 0.5),
                    format!("{}", (h % 7) as f64),
                    "3.0".to_string(),
                ]
            })
            .collect();
        table(&["Time", "a", "b", "c"], rows)
    }

    #[test]
    fn test_missing_timestamp_column() {
        let processor = DataProcessor::new("Timestamp", 72);
        let err = processor
            .validate(hourly_table(10), &mut Vec::new())
            .expect_err("no such column");
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let rows = vec![
            vec!["2004-01-01 00:00".to_string(), "1".to_string(), "2".to_string()],
            vec!["2004-01-01 01:00".to_string(), "3".to_string(), "4".to_string()],
        ];
        let err = DataProcessor::new("Time", 72)
            .validate(table(&["Time", "t", "t"], rows), &mut Vec::new())
            .expect_err("duplicate header");
        assert!(matches!(err, PipelineError::Schema(_)));
        assert!(err.to_string().contains("'t'"));
    }

    #[test]
    fn test_unparseable_timestamp() {
        let rows = vec![
            vec!["2004-01-01 00:00".to_string(), "1".to_string()],
            vec!["soon".to_string(), "2".to_string()],
        ];
        let err = DataProcessor::new("Time", 72)
            .validate(table(&["Time", "a"], rows), &mut Vec::new())
            .expect_err("bad timestamp");
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_unordered_timestamps_rejected() {
        let rows = vec![
            vec!["2004-01-01 01:00".to_string(), "1".to_string()],
            vec!["2004-01-01 00:00".to_string(), "2".to_string()],
        ];
        let err = DataProcessor::new("Time", 72)
            .validate(table(&["Time", "a"], rows), &mut Vec::new())
            .expect_err("unordered");
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_text_columns_pass_through() {
        let rows = vec![
            vec!["2004-01-01 00:00".to_string(), "1".to_string(), "ok".to_string()],
            vec!["2004-01-01 01:00".to_string(), "NaN".to_string(), "".to_string()],
        ];
        let mut warnings = Vec::new();
        let frame = DataProcessor::new("Time", 72)
            .validate(table(&["Time", "a", "status"], rows), &mut warnings)
            .expect("valid");

        assert_eq!(frame.features().len(), 1);
        assert_eq!(frame.features()["a"].values, vec![Some(1.0), None]);
        assert_eq!(
            warnings,
            vec![PipelineWarning::NonNumericColumn {
                column: "status".to_string()
            }]
        );
    }

    #[test]
    fn test_no_numeric_columns() {
        let rows = vec![vec!["2004-01-01 00:00".to_string(), "x".to_string()]];
        let err = DataProcessor::new("Time", 72)
            .validate(table(&["Time", "label"], rows), &mut Vec::new())
            .expect_err("nothing to model");
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_irregular_spacing_is_a_warning() {
        let rows = [0, 60, 120, 300]
            .iter()
            .map(|m| {
                vec![
                    (start() + Duration::minutes(*m)).to_string(),
                    m.to_string(),
                ]
            })
            .collect();
        let mut warnings = Vec::new();
        DataProcessor::new("Time", 72)
            .validate(table(&["Time", "a"], rows), &mut warnings)
            .expect("irregular spacing is not fatal");

        assert_eq!(
            warnings,
            vec![PipelineWarning::IrregularSpacing {
                distinct_intervals: 2,
                min_interval_secs: 3600,
                max_interval_secs: 10800,
            }]
        );
    }

    #[test]
    fn test_fill_forward_then_backward() {
        let values = [None, None, Some(1.0), None, Some(4.0), None];
        assert_eq!(
            fill_forward_backward(&values),
            Some(vec![1.0, 1.0, 1.0, 1.0, 4.0, 4.0])
        );
        assert_eq!(fill_forward_backward(&[None, None]), None);
    }

    #[test]
    fn test_insufficient_training_span() {
        let processor = DataProcessor::new("Time", 72);
        let mut warnings = Vec::new();
        let frame = processor
            .validate(hourly_table(72), &mut warnings)
            .expect("valid");
        let filled = processor.fill_missing(&frame, &mut warnings);

        // 72 hourly rows only span 71 hours
        let err = processor
            .split(
                &frame,
                &filled,
                &TimeWindow::unbounded(),
                &TimeWindow::unbounded(),
                &mut warnings,
            )
            .expect_err("too short");
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                required_hours: 72,
                ..
            }
        ));
    }

    #[test]
    fn test_prepare_drops_constant_and_scales() {
        let processor = DataProcessor::new("Time", 72);
        let frame = processor
            .validate(hourly_table(120), &mut Vec::new())
            .expect("valid");

        let training = TimeWindow::new(None, Some(start() + Duration::hours(99)));
        let (prepared, filled) = processor
            .prepare(&frame, &training, &TimeWindow::unbounded())
            .expect("prepares");

        assert_eq!(prepared.features, vec!["a", "b"]);
        assert_eq!(prepared.dropped_features, vec!["c"]);
        assert_eq!(prepared.training_rows, 0..100);
        assert_eq!(prepared.analysis_rows, 0..120);
        assert_eq!(prepared.training.n_rows(), 100);
        assert_eq!(prepared.analysis.n_rows(), 120);
        assert!(filled.contains_key("c"));
        assert!(prepared.warnings.iter().any(|w| matches!(
            w,
            PipelineWarning::DegenerateFeature { feature, .. } if feature == "c"
        )));

        // Training columns are standardized
        for mean in prepared.training.column_means() {
            assert!(mean.abs() < 1e-9);
        }
        // Analysis rows past the training window keep extrapolating
        let last = prepared.analysis.row(119);
        assert!(last[0] > prepared.training.row(99)[0]);
    }
}
