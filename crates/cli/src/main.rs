//! Vehicle Price Predictor CLI
//!
//! A command-line tool for training quantile models, pricing listings
//! and inspecting model artifacts.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, predict, train};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Vehicle Price Predictor CLI
#[derive(Parser)]
#[command(name = "vpc")]
#[command(author, version, about = "CLI for Vehicle Price Predictor", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a quantile model from historical listings
    Train {
        /// JSON array of historical listing records
        #[arg(long, short)]
        data: PathBuf,

        /// Where to write the model artifact
        #[arg(long, short, env = "VPC_MODEL_PATH", default_value = "./ml/model_quantiles.json")]
        output: PathBuf,

        /// Seed for the train/validation split and the forest
        #[arg(long, default_value_t = pricing_lib::training::DEFAULT_SEED)]
        seed: u64,

        /// Fraction of records held out for validation
        #[arg(long, default_value_t = 0.3)]
        validation_fraction: f64,

        /// Year listing ages are measured against
        #[arg(long, env = "VPC_REFERENCE_YEAR", default_value_t = pricing_lib::REFERENCE_YEAR)]
        reference_year: i64,
    },

    /// Predict price quantiles and sale probabilities for a listing
    Predict {
        /// Model artifact (falls back to the heuristic when unavailable)
        #[arg(long, short, env = "VPC_MODEL_PATH", default_value = "./ml/model_quantiles.json")]
        model: PathBuf,

        /// Use the heuristic predictor even when a model is available
        #[arg(long)]
        heuristic: bool,

        /// JSON file with the listing attributes
        #[arg(
            long,
            short,
            conflicts_with_all = ["year", "km", "gear", "driveline", "fuel_type", "equipment_len"]
        )]
        input: Option<PathBuf>,

        /// Model year
        #[arg(long)]
        year: Option<i64>,

        /// Mileage in kilometres
        #[arg(long)]
        km: Option<f64>,

        /// Gearbox (e.g. Manual, Automatic)
        #[arg(long)]
        gear: Option<String>,

        /// Driveline (e.g. FWD, AWD)
        #[arg(long)]
        driveline: Option<String>,

        /// Fuel type (e.g. Petrol, Diesel, Electric, Hybrid)
        #[arg(long)]
        fuel_type: Option<String>,

        /// Number of listed equipment items
        #[arg(long)]
        equipment_len: Option<u32>,

        /// Year listing ages are measured against by the heuristic
        #[arg(long, env = "VPC_REFERENCE_YEAR", default_value_t = pricing_lib::REFERENCE_YEAR)]
        reference_year: i64,
    },

    /// Show the schema and training report of a model artifact
    Inspect {
        /// Model artifact
        #[arg(long, short, env = "VPC_MODEL_PATH", default_value = "./ml/model_quantiles.json")]
        model: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // Execute command
    match cli.command {
        Commands::Train {
            data,
            output,
            seed,
            validation_fraction,
            reference_year,
        } => {
            let options = train::TrainOptions {
                data,
                output,
                seed,
                validation_fraction,
                reference_year,
            };
            train::train_model(&options, cli.format)?;
        }
        Commands::Predict {
            model,
            heuristic,
            input,
            year,
            km,
            gear,
            driveline,
            fuel_type,
            equipment_len,
            reference_year,
        } => {
            let fields = predict::ListingFields {
                year,
                km,
                gear,
                driveline,
                fuel_type,
                equipment_len,
            };
            let attrs = predict::load_listing(input.as_deref(), fields)?;
            predict::predict_listing(&attrs, &model, heuristic, reference_year, cli.format)?;
        }
        Commands::Inspect { model } => {
            inspect::inspect_model(&model, cli.format)?;
        }
    }

    Ok(())
}
