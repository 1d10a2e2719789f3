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

use crate::anomaly::forest::{ForestParams, IsolationForest};
use crate::anomaly::scorer::{map_rows, score_rows, AnomalyScorer};
use crate::anomaly::quantile;
use crate::config::PipelineConfig;
use crate::processor::FeatureMatrix;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Expected proportion of anomalous rows; only used to place the interpretive threshold
    pub contamination: f64,
    pub forest: ForestParams,
}

impl DetectorParams {
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            contamination: config.contamination,
            forest: ForestParams {
                n_estimators: config.n_estimators,
                max_samples: config.max_samples,
                seed: config.random_state,
                parallel: config.parallel,
            },
        }
    }
}

/// Everything the detector produces for one run
#[derive(Debug, Clone)]
pub struct Detection {
    pub training_scores: Vec<f64>,
    pub analysis_scores: Vec<f64>,
    /// One row per analysis row, one column per modeled feature
    pub contributions: FeatureMatrix,
    /// Training raw-score quantile at `1 - contamination`
    pub threshold: f64,
}

impl Detection {
    /// Analysis rows at or above the contamination threshold
    #[must_use]
    pub fn flagged_rows(&self) -> usize {
        self.analysis_scores
            .iter()
            .filter(|s| **s >= self.threshold)
            .count()
    }
}

/// Isolation-forest detector fitted on the scaled training window.
///
/// Owns its model for the lifetime of one run; nothing is shared between runs.
pub struct AnomalyDetector {
    model: IsolationForest,
    /// Training mean of each scaled feature, the value a feature is reset to
    /// when measuring its contribution
    baseline: Vec<f64>,
    training_scores: Vec<f64>,
    threshold: f64,
    parallel: bool,
}

impl AnomalyDetector {
    #[must_use]
    pub fn fit(training: &FeatureMatrix, params: &DetectorParams) -> Self {
        let start = Instant::now();
        tracing::info!(
            "Training anomaly detection model on {} rows x {} features",
            training.n_rows(),
            training.n_features()
        );

        let model = IsolationForest::fit(training, &params.forest);
        let training_scores = score_rows(&model, training, params.forest.parallel);

        let mut sorted = training_scores.clone();
        sorted.sort_by(f64::total_cmp);
        let threshold = quantile(&sorted, 1.0 - params.contamination);

        let above = training_scores.iter().filter(|s| **s >= threshold).count();
        tracing::debug!(
            "Contamination {} puts the raw-score threshold at {threshold:.4} ({above} rows)",
            params.contamination
        );
        tracing::info!("Model training completed in {:?}", start.elapsed());

        Self {
            model,
            baseline: training.column_means(),
            training_scores,
            threshold,
            parallel: params.forest.parallel,
        }
    }

    /// Raw scores of the training rows the model was fit on
    #[must_use]
    pub fn training_scores(&self) -> &[f64] {
        &self.training_scores
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn score(&self, data: &FeatureMatrix) -> Vec<f64> {
        score_rows(&self.model, data, self.parallel)
    }

    /// Perturbation contributions for every row of `data`
    #[must_use]
    pub fn attribute(&self, data: &FeatureMatrix) -> FeatureMatrix {
        let start = Instant::now();
        let rows = map_rows(data, self.parallel, |row| {
            self.model.contributions(row, &self.baseline)
        });
        tracing::info!(
            "Computed feature contributions for {} rows in {:?}",
            rows.len(),
            start.elapsed()
        );
        FeatureMatrix::from_rows(data.n_features(), rows.into_iter().flatten().collect())
    }

    /// Fit on `training`, then score and attribute every row of `analysis`
    #[must_use]
    pub fn fit_and_score(
        training: &FeatureMatrix,
        analysis: &FeatureMatrix,
        params: &DetectorParams,
    ) -> Detection {
        let detector = Self::fit(training, params);
        let analysis_scores = detector.score(analysis);
        let contributions = detector.attribute(analysis);
        detector.into_detection(analysis_scores, contributions)
    }

    #[must_use]
    pub fn into_detection(
        self,
        analysis_scores: Vec<f64>,
        contributions: FeatureMatrix,
    ) -> Detection {
        Detection {
            training_scores: self.training_scores,
            analysis_scores,
            contributions,
            threshold: self.threshold,
        }
    }
}
