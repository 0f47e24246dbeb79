//! Pricing library for used-vehicle listings
//!
//! This crate provides the core functionality for:
//! - Feature derivation from listing attributes
//! - Rule-based heuristic price prediction
//! - Quantile model training and artifact persistence
//! - Learned price and sale-probability prediction
//! - Predictor selection and observability

pub mod artifact;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod regressor;
pub mod training;

pub use artifact::{ArtifactStore, LoadedArtifact, QuantileModelArtifact, TrainingMetadata};
pub use engine::{EngineStats, ModelSlot, PredictorMode, PricingEngine};
pub use error::{PricingError, Result};
pub use models::*;
pub use observability::{PricingMetrics, StructuredLogger};
pub use predictor::{
    ActivePredictor, FeatureDeriver, GearMatch, HeuristicPredictor, LearnedPredictor, Predictor,
    REFERENCE_YEAR,
};
pub use training::{Trainer, TrainingConfig, TrainingReport};
