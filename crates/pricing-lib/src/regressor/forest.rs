//! Bagged regression trees backed by smartcore
//!
//! Every split considers all features; bootstrap sampling is seeded so a
//! forest refitted on the same rows is identical.

use crate::error::{PricingError, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

/// Fitted smartcore forest over dense `f64` rows
pub type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    /// Nodes with fewer rows become leaves
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 5,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl ForestConfig {
    fn parameters(&self, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_m(n_features.max(1))
            .with_seed(self.seed)
    }
}

/// Random forest predicting the conditional mean
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_trees: usize,
    model: ForestModel,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self> {
        let n_features = x.first().map_or(0, Vec::len);
        if x.is_empty() || x.len() != y.len() {
            return Err(PricingError::Training(format!(
                "random forest needs matching non-empty inputs, got {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }

        let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
            .map_err(|e| PricingError::Training(format!("feature matrix error: {}", e)))?;
        let model = RandomForestRegressor::fit(&matrix, &y.to_vec(), config.parameters(n_features))
            .map_err(|e| PricingError::Training(format!("random forest fit failed: {}", e)))?;

        Ok(Self {
            n_features,
            n_trees: config.n_trees,
            model,
        })
    }

    /// Predict one row; a row smartcore rejects yields NaN
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let Ok(matrix) = DenseMatrix::from_2d_vec(&vec![row.to_vec()]) else {
            return f64::NAN;
        };
        self.model
            .predict(&matrix)
            .ok()
            .and_then(|predictions| predictions.first().copied())
            .unwrap_or(f64::NAN)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}
