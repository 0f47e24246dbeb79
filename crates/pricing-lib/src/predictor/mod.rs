//! Price and sale-probability prediction

mod features;
mod heuristic;
mod learned;
mod output;

pub use features::{
    DerivedListing, FeatureDeriver, FeatureVector, GearMatch, LISTING_FEATURES, REFERENCE_YEAR,
};
pub use heuristic::{base_price, HeuristicPredictor, MAX_PRICE, MIN_PRICE, P10_FACTOR, P90_FACTOR};
pub use learned::{sale_probability, InferenceStats, LearnedPredictor};
pub use output::{order_quantiles, round_probability, MAX_PROB30};

use crate::error::Result;
use crate::models::{ListingAttributes, PredictionResult};
use std::sync::Arc;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Predict price quantiles and sale probabilities for a listing
    fn predict(&self, attrs: &ListingAttributes) -> Result<PredictionResult>;

    /// Short name used in logs and metrics labels
    fn name(&self) -> &'static str;

    /// Version of the model behind the prediction
    fn model_version(&self) -> String;
}

/// The predictor selected for a request
///
/// Chosen by artifact availability: a published artifact yields `Learned`,
/// otherwise `Heuristic`.
#[derive(Clone)]
pub enum ActivePredictor {
    Learned(Arc<LearnedPredictor>),
    Heuristic(HeuristicPredictor),
}

impl ActivePredictor {
    pub fn select(learned: Option<Arc<LearnedPredictor>>, fallback: HeuristicPredictor) -> Self {
        match learned {
            Some(predictor) => ActivePredictor::Learned(predictor),
            None => ActivePredictor::Heuristic(fallback),
        }
    }

    pub fn is_learned(&self) -> bool {
        matches!(self, ActivePredictor::Learned(_))
    }
}

impl Predictor for ActivePredictor {
    fn predict(&self, attrs: &ListingAttributes) -> Result<PredictionResult> {
        match self {
            ActivePredictor::Learned(predictor) => predictor.as_ref().predict(attrs),
            ActivePredictor::Heuristic(predictor) => Predictor::predict(predictor, attrs),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ActivePredictor::Learned(predictor) => predictor.name(),
            ActivePredictor::Heuristic(predictor) => predictor.name(),
        }
    }

    fn model_version(&self) -> String {
        match self {
            ActivePredictor::Learned(predictor) => predictor.model_version(),
            ActivePredictor::Heuristic(predictor) => predictor.model_version(),
        }
    }
}
