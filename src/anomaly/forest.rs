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

//! Isolation forest.
//!
//! Each tree partitions a random subsample of the training rows on random
//! features at random thresholds. Anomalous rows end up isolated close to the
//! root, so a short average path length across trees means a high score.

use crate::anomaly::scorer::AnomalyScorer;
use crate::processor::FeatureMatrix;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search among `n` points.
///
/// Used both to normalize path lengths and to account for the unbuilt
/// subtree below a leaf that still holds `n` points.
#[must_use]
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Upper bound on the subsample drawn for each tree
    pub max_samples: usize,
    pub seed: u64,
    pub parallel: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(
        data: &FeatureMatrix,
        mut sample: Vec<usize>,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, &mut sample, 0, max_depth, rng);
        tree
    }

    /// Grow the subtree for `rows`, returning its node index
    fn grow(
        &mut self,
        data: &FeatureMatrix,
        rows: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if rows.len() <= 1 || depth >= max_depth {
            return id;
        }

        // Only features that still vary within this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..data.n_features())
            .filter_map(|feature| {
                let (lo, hi) = rows
                    .iter()
                    .map(|&r| data.row(r)[feature])
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    });
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);

        let split = partition(rows, |r| data.row(r)[feature] <= threshold);
        let (left_rows, right_rows) = rows.split_at_mut(split);
        let left = self.grow(data, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, right_rows, depth + 1, max_depth, rng);

        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Path length of `row`: edges traversed plus the expected remainder at the leaf
    #[must_use]
    pub fn path_length(&self, row: &[f64]) -> f64 {
        self.walk(row, |_| {})
    }

    /// Like [`Self::path_length`], reporting every feature tested on the way down
    fn walk(&self, row: &[f64], mut visit: impl FnMut(usize)) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    visit(*feature);
                    id = if row[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Move rows matching `pred` to the front, returning how many matched
fn partition(rows: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut split = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(split, i);
            split += 1;
        }
    }
    split
}

/// Fitted isolation forest. Immutable once built.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    normalizer: f64,
}

impl IsolationForest {
    /// Fit on the rows of `data`.
    ///
    /// Each tree draws its own seed from a generator seeded with `params.seed`,
    /// so the forest is identical whether trees are built in parallel or not.
    #[must_use]
    pub fn fit(data: &FeatureMatrix, params: &ForestParams) -> Self {
        let n_rows = data.n_rows();
        let sample_size = params.max_samples.min(n_rows).max(1);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let mut seeder = ChaCha8Rng::seed_from_u64(params.seed);
        let tree_seeds: Vec<u64> = (0..params.n_estimators.max(1)).map(|_| seeder.gen()).collect();

        let build = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let sample = index::sample(&mut rng, n_rows, sample_size).into_vec();
            IsolationTree::fit(data, sample, max_depth, &mut rng)
        };

        let trees: Vec<IsolationTree> = if params.parallel {
            tree_seeds.par_iter().map(|seed| build(*seed)).collect()
        } else {
            tree_seeds.iter().map(|seed| build(*seed)).collect()
        };

        tracing::debug!(
            "Fitted {} trees on {n_rows} rows (subsample {sample_size}, depth {max_depth})",
            trees.len()
        );

        Self {
            trees,
            normalizer: average_path_length(sample_size).max(1.0),
        }
    }

    /// Mean path length of `row` across trees
    #[must_use]
    pub fn mean_path_length(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn score_from_lengths(&self, lengths: impl Iterator<Item = f64>) -> f64 {
        let mean = lengths.sum::<f64>() / self.trees.len() as f64;
        (-mean / self.normalizer).exp2()
    }
}

impl AnomalyScorer for IsolationForest {
    /// `2^(-E[h(x)] / c(psi))`: close to 1 for isolated rows, around 0.5 or
    /// below for rows deep inside the training data
    fn score(&self, row: &[f64]) -> f64 {
        self.score_from_lengths(self.trees.iter().map(|t| t.path_length(row)))
    }

    /// Same result as the default perturbation, bit for bit, but only trees
    /// whose path for `row` tests a feature are walked again for it.
    fn contributions(&self, row: &[f64], baseline: &[f64]) -> Vec<f64> {
        let n_features = row.len();
        let mut lengths = Vec::with_capacity(self.trees.len());
        let mut trees_by_feature: Vec<Vec<usize>> = vec![Vec::new(); n_features];

        for (t, tree) in self.trees.iter().enumerate() {
            let length = tree.walk(row, |feature| {
                let trees = &mut trees_by_feature[feature];
                if trees.last() != Some(&t) {
                    trees.push(t);
                }
            });
            lengths.push(length);
        }

        let original = self.score_from_lengths(lengths.iter().copied());
        let mut perturbed = row.to_vec();
        let mut perturbed_lengths = lengths.clone();

        (0..n_features)
            .map(|j| {
                let affected = &trees_by_feature[j];
                if affected.is_empty() {
                    return 0.0;
                }

                perturbed[j] = baseline[j];
                for &t in affected {
                    perturbed_lengths[t] = self.trees[t].path_length(&perturbed);
                }
                let score = self.score_from_lengths(perturbed_lengths.iter().copied());
                for &t in affected {
                    perturbed_lengths[t] = lengths[t];
                }
                perturbed[j] = row[j];

                (original - score).max(0.0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_matrix(n_rows: usize, n_features: usize, seed: u64) -> FeatureMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data = (0..n_rows * n_features)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        FeatureMatrix::from_rows(n_features, data)
    }

    fn params(parallel: bool) -> ForestParams {
        ForestParams {
            n_estimators: 50,
            max_samples: 64,
            seed: 7,
            parallel,
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // 2 * (ln 255 + gamma) - 2 * 255 / 256
        assert!((average_path_length(256) - 10.244_770_920_116_851).abs() < 1e-9);
    }

    #[test]
    fn test_tree_isolates_every_point_without_depth_limit() {
        let data = uniform_matrix(16, 3, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = IsolationTree::fit(&data, (0..16).collect(), usize::MAX, &mut rng);

        // A fully grown binary tree over 16 distinct points has 16 leaves
        assert_eq!(tree.node_count(), 31);
        for row in data.rows() {
            assert!(tree.path_length(row) >= 1.0);
        }
    }

    #[test]
    fn test_outlier_scores_higher() {
        let mut values: Vec<f64> = uniform_matrix(200, 2, 11).rows().flatten().copied().collect();
        values.extend_from_slice(&[8.0, 8.0]);
        let data = FeatureMatrix::from_rows(2, values);

        let forest = IsolationForest::fit(&data, &params(false));
        let outlier = forest.score(data.row(200));
        let typical = forest.score(&[0.0, 0.0]);

        assert!(outlier > 0.6, "outlier score {outlier}");
        assert!(typical < 0.52, "typical score {typical}");
        assert!(outlier - typical > 0.1);
        assert!(forest.mean_path_length(data.row(200)) < forest.mean_path_length(&[0.0, 0.0]));
    }

    #[test]
    fn test_parallel_fit_is_identical() {
        let data = uniform_matrix(300, 4, 5);
        let sequential = IsolationForest::fit(&data, &params(false));
        let parallel = IsolationForest::fit(&data, &params(true));

        for row in data.rows() {
            assert_eq!(sequential.score(row).to_bits(), parallel.score(row).to_bits());
        }
    }

    #[test]
    fn test_seed_changes_forest() {
        let data = uniform_matrix(100, 3, 5);
        let a = IsolationForest::fit(&data, &params(false));
        let b = IsolationForest::fit(
            &data,
            &ForestParams {
                seed: 8,
                ..params(false)
            },
        );
        assert!(data.rows().any(|row| a.score(row) != b.score(row)));
    }

    #[test]
    fn test_fast_contributions_match_full_rescore() {
        struct Plain<'a>(&'a IsolationForest);

        impl AnomalyScorer for Plain<'_> {
            fn score(&self, row: &[f64]) -> f64 {
                self.0.score(row)
            }
        }

        let data = uniform_matrix(128, 6, 9);
        let forest = IsolationForest::fit(&data, &params(false));
        let baseline = data.column_means();

        for row in data.rows().take(20) {
            let fast = forest.contributions(row, &baseline);
            let full = Plain(&forest).contributions(row, &baseline);
            let fast_bits: Vec<u64> = fast.iter().map(|v| v.to_bits()).collect();
            let full_bits: Vec<u64> = full.iter().map(|v| v.to_bits()).collect();
            assert_eq!(fast_bits, full_bits);
        }
    }
}
