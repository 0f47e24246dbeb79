//! Pricer - used-vehicle price prediction
//!
//! Reads one listing as JSON from stdin and writes its price quantiles and
//! sale probabilities as JSON to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use pricing_lib::{ListingAttributes, PredictorMode, PricingEngine, PricingError, StructuredLogger};
use serde_json::Value;
use std::io::{self, Read, Write};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const PRICER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(io::stderr))
        .init();

    let config = config::PricerConfig::load()?;
    info!(
        model_path = %config.model_path.display(),
        mode = %config.mode,
        reference_year = config.reference_year,
        "Pricer configured"
    );

    let logger = StructuredLogger::new("pricer");
    logger.log_startup(PRICER_VERSION, &config.mode.to_string());

    let engine = PricingEngine::new(config.mode, config.reference_year).with_logger(logger);
    if config.mode != PredictorMode::Heuristic {
        match engine.load_from(&config.model_path) {
            Ok(()) => {}
            Err(err @ (PricingError::ModelUnavailable { .. } | PricingError::SchemaMismatch(_)))
                if config.mode == PredictorMode::Auto =>
            {
                engine.record_fallback(&err.to_string());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to load model from {}", config.model_path.display())
                });
            }
        }
    }

    let request = read_request().context("Failed to read listing from stdin")?;
    let attrs = ListingAttributes::from_json(&request);
    let prediction = engine.predict(&attrs).context("Prediction failed")?;

    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &prediction)?;
    writeln!(stdout)?;
    Ok(())
}

/// Parse the request body; empty input is an empty listing
fn read_request() -> Result<Value> {
    let mut body = String::new();
    io::stdin().read_to_string(&mut body)?;
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&body).context("Request is not valid JSON")
}
