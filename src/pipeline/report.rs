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

//! Validation report handed back to the caller alongside the scored table.

use serde::Serialize;
use std::fmt;

/// Non-fatal condition observed during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Feature excluded from modeling; it is still emitted unchanged
    DegenerateFeature { feature: String, reason: String },
    /// Training-window scores exceed the success criteria
    TrainingAnomaly { mean_score: f64, max_score: f64 },
    /// Consecutive timestamps are not evenly spaced
    IrregularSpacing {
        distinct_intervals: usize,
        min_interval_secs: i64,
        max_interval_secs: i64,
    },
    /// Missing cells were filled forward, then backward
    MissingValuesFilled { feature: String, count: usize },
    /// Column with text cells; passed through without being modeled
    NonNumericColumn { column: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateFeature { feature, reason } => {
                write!(f, "feature '{feature}' excluded from modeling: {reason}")
            }
            Self::TrainingAnomaly {
                mean_score,
                max_score,
            } => write!(
                f,
                "training window looks anomalous (mean {mean_score:.2}, max {max_score:.2})"
            ),
            Self::IrregularSpacing {
                distinct_intervals,
                min_interval_secs,
                max_interval_secs,
            } => write!(
                f,
                "irregular time spacing: {distinct_intervals} distinct intervals \
                 between {min_interval_secs}s and {max_interval_secs}s"
            ),
            Self::MissingValuesFilled { feature, count } => {
                write!(f, "filled {count} missing values in '{feature}'")
            }
            Self::NonNumericColumn { column } => {
                write!(f, "column '{column}' is not numeric and is not modeled")
            }
        }
    }
}

/// Min, max and mean of a set of scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ScoreSummary {
    #[must_use]
    pub fn of(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Self { min, max, mean }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub training_mean_score: f64,
    pub training_max_score: f64,
    /// Whether the training window met the success criteria
    pub passed: bool,
    pub warnings: Vec<PipelineWarning>,
    pub training_rows: usize,
    pub analysis_rows: usize,
    pub modeled_features: Vec<String>,
    pub dropped_features: Vec<String>,
    /// Raw-score quantile at `1 - contamination` of the training window
    pub contamination_threshold: f64,
    /// Analysis rows whose raw score reaches `contamination_threshold`
    pub flagged_rows: usize,
    pub analysis_scores: ScoreSummary,
}

impl ValidationReport {
    #[must_use]
    pub fn has_training_anomaly(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::TrainingAnomaly { .. }))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
