//! Linear quantile regression
//!
//! Minimises the pinball loss plus an L1 penalty on the coefficients of
//! standardised features:
//!
//! ```text
//! sum_i rho_q(y_i - b - z_i . beta) + n * alpha * |beta|_1
//! ```
//!
//! The objective is minimised by majorise-minimise iteratively reweighted
//! least squares: each absolute value is bounded by a quadratic touching it
//! at the current estimate, and the resulting weighted ridge system is
//! solved exactly. Iteration starts from a ridge least-squares fit and is
//! fully deterministic.

use super::solve_linear_system;
use crate::error::{PricingError, Result};
use serde::{Deserialize, Serialize};

/// Smallest feature standard deviation treated as non-constant
const MIN_SCALE: f64 = 1e-12;

/// Quantile regressor hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileConfig {
    /// Target quantile in (0, 1)
    pub quantile: f64,
    /// L1 penalty strength
    pub alpha: f64,
    pub max_iter: usize,
    /// Relative coefficient change that stops iteration
    pub tolerance: f64,
}

impl QuantileConfig {
    pub fn new(quantile: f64) -> Self {
        Self {
            quantile,
            alpha: 0.1,
            max_iter: 200,
            tolerance: 1e-7,
        }
    }
}

/// Fitted linear quantile model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQuantile {
    quantile: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearQuantile {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &QuantileConfig) -> Result<Self> {
        if !(config.quantile > 0.0 && config.quantile < 1.0) {
            return Err(PricingError::Training(format!(
                "quantile {} outside (0, 1)",
                config.quantile
            )));
        }
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(PricingError::Training(format!(
                "quantile regression needs matching non-empty inputs, got {} rows and {} targets",
                n,
                y.len()
            )));
        }
        let p = x[0].len();
        if x.iter().any(|row| row.len() != p) {
            return Err(PricingError::Training("ragged feature matrix".to_string()));
        }

        let (means, scales) = standardisation(x, p);
        // Design rows with a leading intercept column
        let z: Vec<Vec<f64>> = x
            .iter()
            .map(|row| {
                std::iter::once(1.0)
                    .chain(row.iter().zip(&means).zip(&scales).map(|((v, m), s)| (v - m) / s))
                    .collect()
            })
            .collect();

        let nf = n as f64;
        let y_scale = y.iter().map(|v| v.abs()).sum::<f64>() / nf;
        let residual_floor = 1e-6 * (1.0 + y_scale);
        let coefficient_floor = 1e-10 * (1.0 + y_scale);

        // Ridge start
        let ridge = vec![1e-6 * nf; p];
        let ones = vec![1.0; n];
        let mut beta = weighted_solve(&z, y, &ones, &ridge, 0.0).ok_or_else(|| {
            PricingError::Training("initial least-squares fit is singular".to_string())
        })?;

        let linear_term = config.quantile - 0.5;
        for iteration in 0..config.max_iter {
            let weights: Vec<f64> = z
                .iter()
                .zip(y)
                .map(|(row, target)| 0.5 / (target - dot(row, &beta)).abs().max(residual_floor))
                .collect();
            let penalty: Vec<f64> = beta[1..]
                .iter()
                .map(|b| nf * config.alpha / b.abs().max(coefficient_floor))
                .collect();

            let next = weighted_solve(&z, y, &weights, &penalty, linear_term).ok_or_else(|| {
                PricingError::Training(format!(
                    "quantile {} system became singular at iteration {}",
                    config.quantile, iteration
                ))
            })?;

            let change = next
                .iter()
                .zip(&beta)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            let magnitude = next.iter().map(|v| v.abs()).fold(0.0, f64::max);
            beta = next;
            if change <= config.tolerance * (1.0 + magnitude) {
                break;
            }
        }

        Ok(Self {
            quantile: config.quantile,
            means,
            scales,
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.means)
                .zip(&self.scales)
                .zip(&self.coefficients)
                .map(|(((v, m), s), b)| (v - m) / s * b)
                .sum::<f64>()
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    /// Coefficients on standardised features
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

fn standardisation(x: &[Vec<f64>], p: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len() as f64;
    let means: Vec<f64> = (0..p)
        .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
        .collect();
    let scales = (0..p)
        .map(|j| {
            let var = x.iter().map(|row| (row[j] - means[j]).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            if sd > MIN_SCALE {
                sd
            } else {
                1.0
            }
        })
        .collect();
    (means, scales)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solve `(Z' W Z + diag(0, penalty)) beta = Z' W y + linear_term * Z' 1`
fn weighted_solve(
    z: &[Vec<f64>],
    y: &[f64],
    weights: &[f64],
    penalty: &[f64],
    linear_term: f64,
) -> Option<Vec<f64>> {
    let d = z.first()?.len();
    let mut a = vec![vec![0.0; d]; d];
    let mut b = vec![0.0; d];

    for ((row, target), w) in z.iter().zip(y).zip(weights) {
        for i in 0..d {
            let wi = w * row[i];
            b[i] += wi * target + linear_term * row[i];
            for j in i..d {
                a[i][j] += wi * row[j];
            }
        }
    }
    for i in 0..d {
        for j in 0..i {
            a[i][j] = a[j][i];
        }
    }
    for (j, pen) in penalty.iter().enumerate() {
        a[j + 1][j + 1] += pen;
    }

    solve_linear_system(a, b)
}
