//! Pricer configuration

use anyhow::{Context, Result};
use pricing_lib::{PredictorMode, REFERENCE_YEAR};
use serde::Deserialize;
use std::path::PathBuf;

/// Pricer configuration, read from `PRICER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct PricerConfig {
    /// Quantile model artifact to publish at startup
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Predictor selection: auto, learned or heuristic
    #[serde(default)]
    pub mode: PredictorMode,

    /// Year listing ages are measured against
    #[serde(default = "default_reference_year")]
    pub reference_year: i64,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./ml/model_quantiles.json")
}

fn default_reference_year() -> i64 {
    REFERENCE_YEAR
}

impl Default for PricerConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            mode: PredictorMode::default(),
            reference_year: default_reference_year(),
        }
    }
}

impl PricerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PRICER").try_parsing(true))
            .build()
            .context("Failed to read PRICER_* environment")?;

        config
            .try_deserialize()
            .context("Invalid pricer configuration")
    }
}
