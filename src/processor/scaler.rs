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

//! Standardization fit on the training window.

use serde::Serialize;
use std::ops::Range;

/// Dense row-major matrix of scaled feature values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from row-major data. `data.len()` must be a multiple of `n_features`.
    #[must_use]
    pub fn from_rows(n_features: usize, data: Vec<f64>) -> Self {
        debug_assert!(n_features > 0 && data.len() % n_features == 0);
        Self { n_features, data }
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.data.len().checked_div(self.n_features).unwrap_or(0)
    }

    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.n_features;
        &self.data[start..start + self.n_features]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.n_features)
    }

    /// Mean of every column
    #[must_use]
    pub fn column_means(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_features];
        for row in self.rows() {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        let n = self.n_rows().max(1) as f64;
        sums.into_iter().map(|s| s / n).collect()
    }
}

/// Per-feature mean and population standard deviation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureScaler {
    pub features: Vec<String>,
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

impl FeatureScaler {
    /// Fit on `rows` of each column. Columns must have non-zero variance over `rows`.
    #[must_use]
    pub fn fit(columns: &[(&str, &[f64])], rows: &Range<usize>) -> Self {
        let n = rows.len().max(1) as f64;
        let mut features = Vec::with_capacity(columns.len());
        let mut means = Vec::with_capacity(columns.len());
        let mut std_devs = Vec::with_capacity(columns.len());

        for (name, values) in columns {
            let window = &values[rows.clone()];
            let mean = window.iter().sum::<f64>() / n;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            features.push((*name).to_string());
            means.push(mean);
            std_devs.push(variance.sqrt());
        }

        Self {
            features,
            means,
            std_devs,
        }
    }

    /// Scale `rows` of the given columns, which must be in the order they were fit with
    #[must_use]
    pub fn transform(&self, columns: &[(&str, &[f64])], rows: &Range<usize>) -> FeatureMatrix {
        debug_assert_eq!(columns.len(), self.features.len());
        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for row in rows.clone() {
            for (j, (_, values)) in columns.iter().enumerate() {
                let std_dev = self.std_devs[j];
                let scaled = if std_dev > 0.0 {
                    (values[row] - self.means[j]) / std_dev
                } else {
                    0.0
                };
                data.push(scaled);
            }
        }
        FeatureMatrix::from_rows(columns.len(), data)
    }
}
