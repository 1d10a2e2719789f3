//! `SignalCrab` - anomaly scoring for multivariate sensor time series.
//!
//! An isolation forest is fit on a training window of rows assumed normal.
//! Every row of the analysis window gets an abnormality score from 0 to 100
//! and the names of up to seven features that contribute most to it.

pub mod anomaly;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod processor;
pub mod transform;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use frame::{RawTable, TimeWindow};
pub use pipeline::{
    AnomalyRecord, Orchestrator, PipelineOutput, PipelineWarning, Stage, ValidationReport,
};
