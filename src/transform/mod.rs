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

//! Conversion of raw model scores to the 0-100 output scale, and selection of
//! the features that explain each score.

use crate::anomaly::quantile;
use crate::config::PipelineConfig;
use crate::processor::FeatureMatrix;

/// Number of ranked feature slots per row
pub const TOP_FEATURE_COUNT: usize = 7;

/// Ranked feature names for one row; unused slots are empty strings
pub type TopFeatures = [String; TOP_FEATURE_COUNT];

/// Highest raw score the isolation forest can produce
const MAX_RAW_SCORE: f64 = 1.0;

/// Score scale anchored on the training-window raw scores.
///
/// Raw scores inside the normal body of the training distribution (up to the
/// Tukey fence `Q3 + k * IQR`) are mapped through their percentile rank onto
/// `[0, normal_band]`. Past the fence, the share of the remaining headroom up
/// to the maximum raw score is raised to `tail_exponent` and spread over
/// `[normal_band, 100]`, so the tail rises slowly near the fence and reaches
/// 100 at the maximum raw score. The mapping never decreases.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileScale {
    reference: Vec<f64>,
    fence: f64,
    normal_band: f64,
    tail_exponent: f64,
}

impl PercentileScale {
    #[must_use]
    pub fn fit(
        training_scores: &[f64],
        normal_band: f64,
        fence_multiplier: f64,
        tail_exponent: f64,
    ) -> Self {
        let mut reference = training_scores.to_vec();
        reference.sort_by(f64::total_cmp);

        let q1 = quantile(&reference, 0.25);
        let q3 = quantile(&reference, 0.75);
        let fence = fence_multiplier.mul_add(q3 - q1, q3);

        tracing::debug!(
            "Score scale: {} reference scores, Q1 {q1:.4}, Q3 {q3:.4}, fence {fence:.4}",
            reference.len()
        );

        Self {
            reference,
            fence,
            normal_band,
            tail_exponent,
        }
    }

    #[must_use]
    pub const fn fence(&self) -> f64 {
        self.fence
    }

    /// Midrank percentile of `raw` within the training scores, in [0, 100]
    #[must_use]
    pub fn percentile_rank(&self, raw: f64) -> f64 {
        if self.reference.is_empty() {
            return 0.0;
        }
        let below = self.reference.partition_point(|r| *r < raw);
        let at_or_below = self.reference.partition_point(|r| *r <= raw);
        let rank = below as f64 + 0.5 * (at_or_below - below) as f64;
        100.0 * rank / self.reference.len() as f64
    }

    /// Output score in [0, 100] for a raw model score
    #[must_use]
    pub fn normalize(&self, raw: f64) -> f64 {
        let score = if raw <= self.fence {
            self.percentile_rank(raw) * self.normal_band / 100.0
        } else {
            let headroom = MAX_RAW_SCORE - self.fence;
            if headroom > 0.0 {
                let past = ((raw - self.fence) / headroom).min(1.0);
                (100.0 - self.normal_band).mul_add(past.powf(self.tail_exponent), self.normal_band)
            } else {
                100.0
            }
        };
        score.clamp(0.0, 100.0)
    }
}

pub struct ScoreTransformer {
    normal_band: f64,
    fence_multiplier: f64,
    tail_exponent: f64,
    min_contribution: f64,
}

impl ScoreTransformer {
    #[must_use]
    pub const fn new(
        normal_band: f64,
        fence_multiplier: f64,
        tail_exponent: f64,
        min_contribution: f64,
    ) -> Self {
        Self {
            normal_band,
            fence_multiplier,
            tail_exponent,
            min_contribution,
        }
    }

    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.normal_band,
            config.fence_multiplier,
            config.tail_exponent,
            config.min_contribution,
        )
    }

    /// Build the output scale from the training-window raw scores
    #[must_use]
    pub fn scale(&self, raw_scores_training: &[f64]) -> PercentileScale {
        PercentileScale::fit(
            raw_scores_training,
            self.normal_band,
            self.fence_multiplier,
            self.tail_exponent,
        )
    }

    /// Normalize the analysis scores against the training scores and rank the
    /// features of every analysis row
    #[must_use]
    pub fn transform(
        &self,
        raw_scores_training: &[f64],
        raw_scores_analysis: &[f64],
        contributions: &FeatureMatrix,
        features: &[String],
    ) -> (Vec<f64>, Vec<TopFeatures>) {
        let scale = self.scale(raw_scores_training);
        let normalized = raw_scores_analysis
            .iter()
            .map(|raw| scale.normalize(*raw))
            .collect();
        let top = contributions
            .rows()
            .map(|row| self.top_features(row, features))
            .collect();
        (normalized, top)
    }

    /// The up to seven features with the largest contribution above the
    /// threshold. Equal contributions are ordered by name.
    #[must_use]
    pub fn top_features(&self, contributions: &[f64], features: &[String]) -> TopFeatures {
        let mut ranked: Vec<usize> = (0..contributions.len())
            .filter(|&j| contributions[j] > self.min_contribution)
            .collect();
        ranked.sort_by(|&a, &b| {
            contributions[b]
                .total_cmp(&contributions[a])
                .then_with(|| features[a].cmp(&features[b]))
        });

        std::array::from_fn(|slot| {
            ranked
                .get(slot)
                .map_or_else(String::new, |&j| features[j].clone())
        })
    }
}

impl Default for ScoreTransformer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
