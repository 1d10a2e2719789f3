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

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use signalcrab::frame::parse_timestamp;
use signalcrab::{Orchestrator, PipelineConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Package version followed by the source revision
const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SIGNALCRAB_REVISION"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "signalcrab")]
#[command(author = "Daniel Freiermuth")]
#[command(version = VERSION)]
#[command(about = "Score multivariate sensor time series for anomalies", long_about = None)]
struct Args {
    /// CSV file with a timestamp column and numeric feature columns
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the scored CSV
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Write the validation report as JSON
    #[arg(long, value_name = "REPORT")]
    report: Option<PathBuf>,

    /// Config file to use instead of the per-user one
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    contamination: Option<f64>,

    #[arg(long)]
    random_state: Option<u64>,

    /// First timestamp of the training window
    #[arg(long, value_parser = timestamp_arg)]
    train_start: Option<NaiveDateTime>,

    /// Last timestamp of the training window
    #[arg(long, value_parser = timestamp_arg)]
    train_end: Option<NaiveDateTime>,

    /// First timestamp of the analysis window
    #[arg(long, value_parser = timestamp_arg)]
    analysis_start: Option<NaiveDateTime>,

    /// Last timestamp of the analysis window
    #[arg(long, value_parser = timestamp_arg)]
    analysis_end: Option<NaiveDateTime>,

    #[arg(long)]
    timestamp_column: Option<String>,

    /// Fit and score on a single thread
    #[arg(long)]
    sequential: bool,
}

fn timestamp_arg(text: &str) -> Result<NaiveDateTime> {
    parse_timestamp(text).ok_or_else(|| anyhow!("unrecognized timestamp '{text}'"))
}

impl Args {
    /// Config file values with the command-line overrides applied
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::load_default().context("Failed to load user config")?,
        };

        if let Some(contamination) = self.contamination {
            config.contamination = contamination;
        }
        if let Some(seed) = self.random_state {
            config.random_state = seed;
        }
        if let Some(column) = &self.timestamp_column {
            column.clone_into(&mut config.timestamp_column);
        }
        if self.train_start.is_some() {
            config.training_window.start = self.train_start;
        }
        if self.train_end.is_some() {
            config.training_window.end = self.train_end;
        }
        if self.analysis_start.is_some() {
            config.analysis_window.start = self.analysis_start;
        }
        if self.analysis_end.is_some() {
            config.analysis_window.end = self.analysis_end;
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG to override (e.g. RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    tracing::info!("SignalCrab {VERSION} starting up");

    let args = Args::parse();
    let orchestrator = Orchestrator::new(args.resolve_config()?)?;

    let output = orchestrator
        .run_csv_path(&args.input)
        .with_context(|| format!("Anomaly detection failed for {}", args.input.display()))?;

    output
        .table
        .write_csv_path(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!("Wrote {} scored rows to {}", output.table.len(), args.output.display());

    if let Some(path) = &args.report {
        std::fs::write(path, output.report.to_json()?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        tracing::info!("Wrote validation report to {}", path.display());
    }

    let report = &output.report;
    println!(
        "Training rows: {}  Analysis rows: {}  Features: {} modeled, {} dropped",
        report.training_rows,
        report.analysis_rows,
        report.modeled_features.len(),
        report.dropped_features.len()
    );
    println!(
        "Training scores: mean {:.2}, max {:.2} ({})",
        report.training_mean_score,
        report.training_max_score,
        if report.passed { "passed" } else { "FAILED" }
    );
    println!(
        "Analysis scores: min {:.2}, mean {:.2}, max {:.2}; {} rows above threshold",
        report.analysis_scores.min,
        report.analysis_scores.mean,
        report.analysis_scores.max,
        report.flagged_rows
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    Ok(())
}
