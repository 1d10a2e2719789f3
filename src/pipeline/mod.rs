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

//! End-to-end run: validation, preprocessing, model fitting, scoring,
//! attribution, score transform, success criteria and output table.

pub mod report;

pub use report::{PipelineWarning, ScoreSummary, ValidationReport};

use crate::anomaly::{AnomalyDetector, DetectorParams};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{RawTable, TimeSeriesFrame};
use crate::processor::{DataProcessor, FilledColumns, PreparedData};
use crate::transform::{ScoreTransformer, TopFeatures, TOP_FEATURE_COUNT};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

/// Name of the appended score column
pub const SCORE_COLUMN: &str = "Abnormality_score";

/// Names of the appended top-feature columns
#[must_use]
pub fn top_feature_columns() -> [String; TOP_FEATURE_COUNT] {
    std::array::from_fn(|i| format!("top_feature_{}", i + 1))
}

/// Steps of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Validate,
    Preprocess,
    Split,
    Train,
    Score,
    Attribute,
    Transform,
    ValidateSuccessCriteria,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Preprocess => "preprocess",
            Self::Split => "split",
            Self::Train => "train",
            Self::Score => "score",
            Self::Attribute => "attribute",
            Self::Transform => "transform",
            Self::ValidateSuccessCriteria => "validate success criteria",
            Self::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Final per-row result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub timestamp: NaiveDateTime,
    /// Abnormality score in [0, 100]
    pub score: f64,
    pub top_features: TopFeatures,
}

/// Everything a run hands back to the caller
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Original columns plus the score and top-feature columns
    pub table: RawTable,
    pub records: Vec<AnomalyRecord>,
    pub report: ValidationReport,
}

/// Run `f` as pipeline stage `stage`, tagging any error with it
fn stage<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let _span = tracing::info_span!("stage", %stage).entered();
    let start = Instant::now();
    let result = f().map_err(|e| e.at(stage));
    tracing::debug!("Stage {stage} took {:?}", start.elapsed());
    result
}

/// Sequences one pipeline run. Holds only the configuration; the scaler and
/// model are created inside [`Orchestrator::run`] and dropped when it returns.
pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV file and run on it
    pub fn run_csv_path(&self, path: &Path) -> Result<PipelineOutput> {
        let table = stage(Stage::Load, || RawTable::read_csv_path(path))?;
        self.run(table)
    }

    /// Read CSV from `reader` and run on it
    pub fn run_csv<R: Read>(&self, reader: R) -> Result<PipelineOutput> {
        let table = stage(Stage::Load, || RawTable::read_csv(reader))?;
        self.run(table)
    }

    pub fn run(&self, table: RawTable) -> Result<PipelineOutput> {
        let run_start = Instant::now();
        let config = &self.config;
        let processor = DataProcessor::from_config(config);
        let mut warnings = Vec::new();

        let frame = stage(Stage::Validate, || {
            if let Some(clash) = table
                .headers()
                .iter()
                .find(|h| *h == SCORE_COLUMN || h.starts_with("top_feature_"))
            {
                return Err(PipelineError::Schema(format!(
                    "input already has an output column '{clash}'"
                )));
            }
            processor.validate(table, &mut warnings)
        })?;

        let filled = stage(Stage::Preprocess, || {
            Ok(processor.fill_missing(&frame, &mut warnings))
        })?;

        let prepared = stage(Stage::Split, || {
            processor.split(
                &frame,
                &filled,
                &config.training_window,
                &config.analysis_window,
                &mut warnings,
            )
        })?;

        let params = DetectorParams::from_config(config);
        let detector = stage(Stage::Train, || {
            Ok(AnomalyDetector::fit(&prepared.training, &params))
        })?;

        let analysis_scores = stage(Stage::Score, || Ok(detector.score(&prepared.analysis)))?;

        let contributions = stage(Stage::Attribute, || {
            Ok(detector.attribute(&prepared.analysis))
        })?;

        let transformer = ScoreTransformer::from_config(config);
        let (scores, top_features) = stage(Stage::Transform, || {
            Ok(transformer.transform(
                detector.training_scores(),
                &analysis_scores,
                &contributions,
                &prepared.features,
            ))
        })?;

        let (training_mean, training_max) = stage(Stage::ValidateSuccessCriteria, || {
            let scale = transformer.scale(detector.training_scores());
            let normalized: Vec<f64> = detector
                .training_scores()
                .iter()
                .map(|raw| scale.normalize(*raw))
                .collect();
            let summary = ScoreSummary::of(&normalized);
            tracing::info!(
                "Training period - Mean score: {:.2}, Max score: {:.2}",
                summary.mean,
                summary.max
            );

            if summary.mean >= config.success_mean_threshold
                || summary.max >= config.success_max_threshold
            {
                let warning = PipelineWarning::TrainingAnomaly {
                    mean_score: summary.mean,
                    max_score: summary.max,
                };
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
            Ok((summary.mean, summary.max))
        })?;

        let output = stage(Stage::Emit, || {
            let table = emit_table(&frame, &filled, &prepared, &scores, &top_features)?;
            let records = prepared
                .analysis_rows
                .clone()
                .zip(scores.iter().zip(&top_features))
                .map(|(row, (score, top))| AnomalyRecord {
                    timestamp: frame.timestamps()[row],
                    score: *score,
                    top_features: top.clone(),
                })
                .collect();

            let flagged_rows = analysis_scores
                .iter()
                .filter(|s| **s >= detector.threshold())
                .count();
            let passed = !warnings
                .iter()
                .any(|w| matches!(w, PipelineWarning::TrainingAnomaly { .. }));

            let report = ValidationReport {
                training_mean_score: training_mean,
                training_max_score: training_max,
                passed,
                warnings: std::mem::take(&mut warnings),
                training_rows: prepared.training_rows.len(),
                analysis_rows: prepared.analysis_rows.len(),
                modeled_features: prepared.features.clone(),
                dropped_features: prepared.dropped_features.clone(),
                contamination_threshold: detector.threshold(),
                flagged_rows,
                analysis_scores: ScoreSummary::of(&scores),
            };

            Ok(PipelineOutput {
                table,
                records,
                report,
            })
        })?;

        tracing::info!(
            "Anomaly detection completed for {} rows in {:?}",
            output.records.len(),
            run_start.elapsed()
        );
        Ok(output)
    }
}

/// Analysis rows with their original cells, missing numeric cells replaced by
/// their filled value, and the score and feature columns appended
fn emit_table(
    frame: &TimeSeriesFrame,
    filled: &FilledColumns,
    prepared: &PreparedData,
    scores: &[f64],
    top_features: &[TopFeatures],
) -> Result<RawTable> {
    let source = frame.table();
    let mut headers = source.headers().to_vec();
    headers.push(SCORE_COLUMN.to_string());
    headers.extend(top_feature_columns());

    let rows = prepared
        .analysis_rows
        .clone()
        .zip(scores.iter().zip(top_features))
        .map(|(row, (score, top))| {
            let mut cells = Vec::with_capacity(headers.len());
            cells.extend_from_slice(&source.rows()[row]);
            for (name, column) in frame.features() {
                if column.values[row].is_none() {
                    if let Some(values) = filled.get(name) {
                        cells[column.position] = values[row].to_string();
                    }
                }
            }
            cells.push(format!("{score:.4}"));
            cells.extend(top.iter().cloned());
            cells
        })
        .collect();

    RawTable::new(headers, rows)
}
