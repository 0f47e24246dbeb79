//! Error taxonomy for prediction and training
//!
//! Missing or malformed listing attributes are never errors: they are
//! recovered by defaulting during parsing. Everything here is surfaced to
//! the caller so it can choose the heuristic fallback or abort training.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the pricing core
#[derive(Debug, Error)]
pub enum PricingError {
    /// Artifact missing, unreadable or corrupt. Callers may fall back to the
    /// heuristic predictor.
    #[error("model unavailable at {path}: {reason}")]
    ModelUnavailable { path: PathBuf, reason: String },

    /// Artifact feature list cannot be reconciled with its regressors.
    /// Fatal for that artifact; it has to be retrained.
    #[error("artifact schema mismatch: {0}")]
    SchemaMismatch(String),

    /// No usable records remain after filtering the training dataset
    #[error("training dataset is empty: {0}")]
    EmptyDataset(String),

    /// A regressor produced a non-finite value
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// A regressor could not be fitted
    #[error("training failed: {0}")]
    Training(String),

    /// Artifact could not be written
    #[error("failed to persist artifact to {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PricingError {
    /// True when the caller should degrade to the heuristic predictor
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, PricingError::ModelUnavailable { .. })
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PricingError::ModelUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PricingError>;
