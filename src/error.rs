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

//! Fatal pipeline errors.
//!
//! Non-fatal conditions never travel through this type; they are collected as
//! [`PipelineWarning`](crate::pipeline::PipelineWarning)s in the run report.

use crate::pipeline::Stage;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Timestamp column missing or unparseable, unordered rows, or no numeric features left
    #[error("schema error: {0}")]
    Schema(String),

    /// Training window spans less than the configured minimum duration
    #[error(
        "insufficient training data: window spans {actual_hours:.1} hours, \
         at least {required_hours} hours required"
    )]
    InsufficientData {
        actual_hours: f64,
        required_hours: u32,
    },

    /// A run parameter is out of range or selects nothing
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Error raised while the orchestrator was executing `stage`
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Tag this error with the pipeline stage it was raised in.
    ///
    /// Already tagged errors keep their original stage.
    #[must_use]
    pub fn at(self, stage: Stage) -> Self {
        if matches!(self, Self::Stage { .. }) {
            self
        } else {
            Self::Stage {
                stage,
                source: Box::new(self),
            }
        }
    }

    /// The stage this error was raised in, if known
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        if let Self::Stage { stage, .. } = self {
            Some(*stage)
        } else {
            None
        }
    }

    /// The underlying error with any stage tagging removed
    #[must_use]
    pub fn root(&self) -> &Self {
        if let Self::Stage { source, .. } = self {
            source.root()
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging_is_idempotent() {
        let err = PipelineError::Schema("no timestamp column".to_string())
            .at(Stage::Validate)
            .at(Stage::Emit);

        assert_eq!(err.stage(), Some(Stage::Validate));
        assert!(matches!(err.root(), PipelineError::Schema(_)));
        assert_eq!(
            err.to_string(),
            "validate stage failed: schema error: no timestamp column"
        );
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = PipelineError::InsufficientData {
            actual_hours: 48.0,
            required_hours: 72,
        };
        assert_eq!(
            err.to_string(),
            "insufficient training data: window spans 48.0 hours, at least 72 hours required"
        );
    }
}
