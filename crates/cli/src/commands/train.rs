//! Model training command

use anyhow::{bail, Context, Result};
use colored::Colorize;
use pricing_lib::{ArtifactStore, StructuredLogger, Trainer, TrainingConfig, TrainingReport};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::output::{format_metric, print_json, print_success, print_table, FieldRow, OutputFormat};

/// Parameters of one training run
pub struct TrainOptions {
    pub data: PathBuf,
    pub output: PathBuf,
    pub seed: u64,
    pub validation_fraction: f64,
    pub reference_year: i64,
}

#[derive(Serialize)]
struct TrainSummary<'a> {
    output: String,
    checksum: String,
    features: &'a [String],
    report: &'a TrainingReport,
}

/// Fit a quantile model on a JSON dataset and save the artifact
pub fn train_model(options: &TrainOptions, format: OutputFormat) -> Result<()> {
    if !(0.0..1.0).contains(&options.validation_fraction) {
        bail!(
            "--validation-fraction must be in [0, 1), got {}",
            options.validation_fraction
        );
    }

    let raw = fs::read_to_string(&options.data)
        .with_context(|| format!("Failed to read dataset {}", options.data.display()))?;
    let dataset: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Dataset {} is not valid JSON", options.data.display()))?;

    let config = TrainingConfig {
        validation_fraction: options.validation_fraction,
        reference_year: options.reference_year,
        ..TrainingConfig::default()
    }
    .with_seed(options.seed);

    let artifact = Trainer::new(config)
        .fit_json(&dataset)
        .context("Training failed")?;
    let checksum = ArtifactStore::save(&artifact, &options.output)
        .context("Failed to save model artifact")?;

    let report = &artifact.metadata().report;
    StructuredLogger::new("vpc").log_training_completed(&options.output, &checksum, report);

    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            output: options.output.display().to_string(),
            checksum,
            features: artifact.features(),
            report,
        })?,
        OutputFormat::Table => {
            print_success(&format!(
                "Model written to {}",
                options.output.display().to_string().cyan()
            ));
            print_table(&report_rows(report));
            println!("Checksum: {}", checksum.dimmed());
        }
    }
    Ok(())
}

/// Rows describing a training report
pub fn report_rows(report: &TrainingReport) -> Vec<FieldRow> {
    vec![
        FieldRow::new("Training rows", report.n_train),
        FieldRow::new("Validation rows", report.n_validation),
        FieldRow::new("Imputed prices", report.imputed_prices),
        FieldRow::new("Pinball loss p10", format_metric(report.pinball_p10)),
        FieldRow::new("Pinball loss p50", format_metric(report.pinball_p50)),
        FieldRow::new("Pinball loss p90", format_metric(report.pinball_p90)),
        FieldRow::new(
            "p10-p90 coverage",
            report
                .interval_coverage
                .map(crate::output::format_probability)
                .unwrap_or_else(|| "-".to_string()),
        ),
        FieldRow::new("Duration", format!("{} ms", report.duration_ms)),
    ]
}
