use crate::processor::FeatureMatrix;
use rayon::prelude::*;

/// Trait for fitted row scorers
pub trait AnomalyScorer: Send + Sync {
    /// Raw score of one scaled row, higher = more anomalous
    fn score(&self, row: &[f64]) -> f64;

    /// Per-feature responsibility for the score of `row`.
    ///
    /// Feature `j` is replaced by `baseline[j]` with everything else held, the
    /// row is re-scored, and the drop in score is the contribution. Features
    /// whose replacement raises the score get zero.
    fn contributions(&self, row: &[f64], baseline: &[f64]) -> Vec<f64> {
        let original = self.score(row);
        let mut perturbed = row.to_vec();
        (0..row.len())
            .map(|j| {
                perturbed[j] = baseline[j];
                let score = self.score(&perturbed);
                perturbed[j] = row[j];
                (original - score).max(0.0)
            })
            .collect()
    }
}

/// Apply `f` to every row, keeping row order whether or not rayon is used
pub fn map_rows<T, F>(data: &FeatureMatrix, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&[f64]) -> T + Send + Sync,
{
    if parallel {
        (0..data.n_rows())
            .into_par_iter()
            .map(|i| f(data.row(i)))
            .collect()
    } else {
        data.rows().map(f).collect()
    }
}

/// Score every row of `data`
pub fn score_rows<S: AnomalyScorer + ?Sized>(
    scorer: &S,
    data: &FeatureMatrix,
    parallel: bool,
) -> Vec<f64> {
    map_rows(data, parallel, |row| scorer.score(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distance from the origin, an easy scorer to reason about
    struct NormScorer;

    impl AnomalyScorer for NormScorer {
        fn score(&self, row: &[f64]) -> f64 {
            row.iter().map(|v| v * v).sum::<f64>().sqrt()
        }
    }

    #[test]
    fn test_perturbation_contributions() {
        let contributions = NormScorer.contributions(&[3.0, 4.0, 0.0], &[0.0, 0.0, 5.0]);

        // Zeroing 3 leaves 4, zeroing 4 leaves 3, moving the last feature away from zero
        // makes the row more anomalous and is clipped
        assert!((contributions[0] - 1.0).abs() < 1e-12);
        assert!((contributions[1] - 2.0).abs() < 1e-12);
        assert_eq!(contributions[2], 0.0);
    }

    #[test]
    fn test_score_rows_keeps_order() {
        let data = FeatureMatrix::from_rows(1, (0..1000).map(f64::from).collect());
        let sequential = score_rows(&NormScorer, &data, false);
        let parallel = score_rows(&NormScorer, &data, true);

        assert_eq!(sequential, parallel);
        assert_eq!(sequential[999], 999.0);
    }
}
