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

use crate::error::{PipelineError, Result};
use crate::frame::TimeWindow;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Run parameters for one pipeline invocation.
///
/// Every field has a default, so a config file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the timestamp column
    pub timestamp_column: String,
    /// Minimum span of the training window
    pub min_training_hours: u32,
    /// Expected proportion of anomalous rows, used only to interpret scores
    pub contamination: f64,
    /// Seed for the isolation forest
    pub random_state: u64,
    pub n_estimators: usize,
    /// Upper bound on the per-tree subsample size
    pub max_samples: usize,
    /// Rows considered normal; used to fit the scaler, the model and the score scale
    pub training_window: TimeWindow,
    /// Rows to score
    pub analysis_window: TimeWindow,
    /// A feature is only ranked if its contribution is strictly greater than this
    pub min_contribution: f64,
    /// Output score reached at the top of the normal body of training scores
    pub normal_band: f64,
    /// Tukey fence multiplier separating the normal body from the tail
    pub fence_multiplier: f64,
    /// Power applied to the share of headroom a raw score has covered past the fence
    pub tail_exponent: f64,
    /// Use the rayon thread pool for fitting and scoring
    pub parallel: bool,
    /// Training-window mean score at or above this is reported as a training anomaly
    pub success_mean_threshold: f64,
    /// Training-window max score at or above this is reported as a training anomaly
    pub success_max_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timestamp_column: "Time".to_string(),
            min_training_hours: 72,
            contamination: 0.1,
            random_state: 42,
            n_estimators: 100,
            max_samples: 256,
            training_window: TimeWindow::unbounded(),
            analysis_window: TimeWindow::unbounded(),
            min_contribution: 0.0,
            normal_band: 10.0,
            fence_multiplier: 1.5,
            tail_exponent: 2.0,
            parallel: true,
            success_mean_threshold: 10.0,
            success_max_threshold: 25.0,
        }
    }
}

impl PipelineConfig {
    /// Get the path to the per-user config file
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("signalcrab").join("config.json"))
    }

    /// Load the per-user config, returning defaults if there is none
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::config_path().filter(|p| p.exists()) {
            return Self::load(&path);
        }
        tracing::info!("No user config found, using defaults");
        Ok(Self::default())
    }

    /// Load a config file. Unlisted fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidParameter(msg));

        if self.timestamp_column.trim().is_empty() {
            return invalid("timestamp_column must not be empty".to_string());
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return invalid(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            ));
        }
        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1".to_string());
        }
        if self.max_samples < 2 {
            return invalid(format!(
                "max_samples must be at least 2, got {}",
                self.max_samples
            ));
        }
        if !self.min_contribution.is_finite() || self.min_contribution < 0.0 {
            return invalid(format!(
                "min_contribution must be a non-negative number, got {}",
                self.min_contribution
            ));
        }
        if !(self.normal_band > 0.0 && self.normal_band < 100.0) {
            return invalid(format!(
                "normal_band must be in (0, 100), got {}",
                self.normal_band
            ));
        }
        if !self.fence_multiplier.is_finite() || self.fence_multiplier < 0.0 {
            return invalid(format!(
                "fence_multiplier must be a non-negative number, got {}",
                self.fence_multiplier
            ));
        }
        if !self.tail_exponent.is_finite() || self.tail_exponent < 1.0 {
            return invalid(format!(
                "tail_exponent must be at least 1, got {}",
                self.tail_exponent
            ));
        }
        for (name, window) in [
            ("training_window", &self.training_window),
            ("analysis_window", &self.analysis_window),
        ] {
            if let (Some(start), Some(end)) = (window.start, window.end) {
                if start > end {
                    return invalid(format!("{name} starts after it ends"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        PipelineConfig::default()
            .validate()
            .expect("defaults validate");
    }

    #[test]
    fn test_contamination_range() {
        for contamination in [0.0, -0.1, 0.51, f64::NAN] {
            let config = PipelineConfig {
                contamination,
                ..PipelineConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidParameter(_))),
                "contamination {contamination} should be rejected"
            );
        }

        let config = PipelineConfig {
            contamination: 0.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"contamination": 0.05, "training_window": {{"end": "2004-01-05T23:59:59"}}}}"#
        )
        .expect("write config");

        let config = PipelineConfig::load(file.path()).expect("loads");
        assert!((config.contamination - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.random_state, 42);
        assert!(config.training_window.start.is_none());
        assert!(config.training_window.end.is_some());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");
        let config = PipelineConfig {
            random_state: 7,
            parallel: false,
            ..PipelineConfig::default()
        };

        config.save(&path).expect("saves");
        assert_eq!(PipelineConfig::load(&path).expect("loads"), config);
    }

    #[test]
    fn test_tail_exponent_below_one_rejected() {
        for tail_exponent in [0.5, 0.0, f64::INFINITY] {
            let config = PipelineConfig {
                tail_exponent,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "{tail_exponent}");
        }
    }

    #[test]
    fn test_reversed_window_rejected() {
        let later = chrono::NaiveDate::from_ymd_opt(2004, 1, 5)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        let earlier = later - chrono::Duration::days(1);
        let config = PipelineConfig {
            analysis_window: TimeWindow::new(Some(later), Some(earlier)),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
