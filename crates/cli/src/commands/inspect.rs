//! Model inspection command

use anyhow::{Context, Result};
use colored::Colorize;
use pricing_lib::{ArtifactStore, TrainingMetadata};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::train::report_rows;
use crate::output::{print_json, print_table, FieldRow, OutputFormat};

/// Row for the regressor table
#[derive(Tabled, Serialize)]
struct RegressorRow {
    #[tabled(rename = "Quantile")]
    quantile: String,
    #[tabled(rename = "Regressor")]
    kind: String,
    #[tabled(rename = "Features")]
    n_features: usize,
}

#[derive(Serialize)]
struct ModelSummary<'a> {
    path: String,
    version: String,
    checksum: String,
    features: &'a [String],
    regressors: Vec<RegressorRow>,
    metadata: &'a TrainingMetadata,
}

/// Show the schema and training report of an artifact
pub fn inspect_model(path: &Path, format: OutputFormat) -> Result<()> {
    let loaded = ArtifactStore::load(path)
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    let artifact = &loaded.artifact;

    let regressors: Vec<RegressorRow> = artifact
        .regressors()
        .iter()
        .map(|(quantile, regressor)| RegressorRow {
            quantile: quantile.to_string(),
            kind: regressor.kind().to_string(),
            n_features: regressor.n_features(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&ModelSummary {
            path: path.display().to_string(),
            version: loaded.version(),
            checksum: loaded.checksum.clone(),
            features: artifact.features(),
            regressors,
            metadata: artifact.metadata(),
        })?,
        OutputFormat::Table => {
            let metadata = artifact.metadata();
            println!("{}", "Quantile Model".bold());
            println!("{}", "=".repeat(50));
            println!("Path:                   {}", path.display().to_string().cyan());
            println!("Version:                {}", loaded.version().cyan());
            println!("Trained at:             {}", metadata.trained_at.to_rfc3339());
            println!("Seed:                   {}", metadata.seed);
            println!("Reference year:         {}", metadata.reference_year);
            println!("Features:               {}", artifact.features().join(", "));
            println!();

            print_table(&regressors);
            println!();

            println!("{}", "Validation".bold());
            let mut rows = report_rows(&metadata.report);
            rows.insert(
                0,
                FieldRow::new("Validation fraction", metadata.validation_fraction),
            );
            print_table(&rows);
        }
    }
    Ok(())
}
