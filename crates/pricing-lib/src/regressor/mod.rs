//! Fitted regressors stored inside a quantile model artifact
//!
//! - [`RandomForest`]: smartcore random forest regressor, used for the
//!   median
//! - [`LinearQuantile`]: L1-penalised linear quantile regression, used for
//!   the low and high quantiles

mod forest;
mod linear;

pub use forest::{ForestConfig, ForestModel, RandomForest};
pub use linear::{LinearQuantile, QuantileConfig};

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::lu::LUDecomposable;

/// A fitted regressor over a fixed-width feature row
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest(RandomForest),
    LinearQuantile(LinearQuantile),
}

impl Regressor {
    /// Predict a single row. Rows must have [`Regressor::n_features`] values;
    /// a malformed regressor yields NaN rather than panicking.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        if row.len() != self.n_features() {
            return f64::NAN;
        }
        match self {
            Regressor::RandomForest(forest) => forest.predict_row(row),
            Regressor::LinearQuantile(linear) => linear.predict_row(row),
        }
    }

    /// Number of input features the regressor was fitted on
    pub fn n_features(&self) -> usize {
        match self {
            Regressor::RandomForest(forest) => forest.n_features(),
            Regressor::LinearQuantile(linear) => linear.n_features(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Regressor::RandomForest(_) => "random_forest",
            Regressor::LinearQuantile(_) => "linear_quantile",
        }
    }
}

impl From<RandomForest> for Regressor {
    fn from(forest: RandomForest) -> Self {
        Regressor::RandomForest(forest)
    }
}

impl From<LinearQuantile> for Regressor {
    fn from(linear: LinearQuantile) -> Self {
        Regressor::LinearQuantile(linear)
    }
}

/// Solve `a * x = b` through smartcore's LU decomposition.
/// Returns `None` for a singular or non-finite system.
pub(crate) fn solve_linear_system(a: Vec<Vec<f64>>, b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }
    let a = DenseMatrix::from_2d_vec(&a).ok()?;
    let column: Vec<Vec<f64>> = b.into_iter().map(|v| vec![v]).collect();
    let b = DenseMatrix::from_2d_vec(&column).ok()?;
    let x = a.lu_solve_mut(b).ok()?;

    let x: Vec<f64> = (0..n).map(|i| *x.get((i, 0))).collect();
    x.iter().all(|v| v.is_finite()).then_some(x)
}
