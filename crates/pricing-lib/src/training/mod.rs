//! Offline training of quantile model artifacts
//!
//! Historical listings are turned into a feature matrix with the same
//! derivation the predictors use, split into train and validation
//! partitions with a seeded shuffle, and fitted with three independent
//! regressors: a random forest for the median and linear quantile
//! regressors for the 10th and 90th percentiles.


use crate::artifact::{QuantileModelArtifact, TrainingMetadata};
use crate::error::{PricingError, Result};
use crate::models::HistoricalListing;
use crate::predictor::{FeatureDeriver, FeatureVector, LISTING_FEATURES, REFERENCE_YEAR};
use crate::regressor::{ForestConfig, LinearQuantile, QuantileConfig, RandomForest, Regressor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Covariates only the trainer supplies; inference fills them with 0
pub const TRAINING_ONLY_FEATURES: [&str; 2] = ["season_month", "supply_density"];

/// Seed used for the split and every stochastic estimator
pub const DEFAULT_SEED: u64 = 42;

/// Training parameters. The seed is part of the artifact metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of records held out for validation
    pub validation_fraction: f64,
    pub seed: u64,
    pub reference_year: i64,
    pub season_month: f64,
    pub supply_density: f64,
    pub low_quantile: f64,
    pub high_quantile: f64,
    /// L1 penalty of the low/high quantile regressors
    pub quantile_alpha: f64,
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.3,
            seed: DEFAULT_SEED,
            reference_year: REFERENCE_YEAR,
            season_month: 1.0,
            supply_density: 12.0,
            low_quantile: 0.10,
            high_quantile: 0.90,
            quantile_alpha: 0.1,
            forest: ForestConfig {
                seed: DEFAULT_SEED,
                ..ForestConfig::default()
            },
        }
    }
}

impl TrainingConfig {
    /// Use one seed for the split and the forest
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.forest.seed = seed;
        self
    }
}

/// Validation-partition quality of a fitted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_validation: usize,
    pub imputed_prices: usize,
    /// Mean pinball loss per quantile; absent without validation rows
    pub pinball_p10: Option<f64>,
    pub pinball_p50: Option<f64>,
    pub pinball_p90: Option<f64>,
    /// Share of validation prices inside the predicted p10..p90 band
    pub interval_coverage: Option<f64>,
    pub duration_ms: u64,
}

/// Feature matrix and imputed target for a training dataset
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub imputed_prices: usize,
}

/// Fits [`QuantileModelArtifact`]s from historical listings
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    deriver: FeatureDeriver,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        let deriver = FeatureDeriver::new().with_reference_year(config.reference_year);
        Self { config, deriver }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Ordered feature schema of every artifact this trainer produces
    pub fn feature_names() -> Vec<String> {
        LISTING_FEATURES
            .iter()
            .chain(TRAINING_ONLY_FEATURES.iter())
            .map(|name| name.to_string())
            .collect()
    }

    /// Parse a JSON array of listing records, dropping non-object entries
    pub fn records_from_json(dataset: &Value) -> Result<Vec<HistoricalListing>> {
        let items = dataset.as_array().ok_or_else(|| {
            PricingError::EmptyDataset("dataset is not a JSON array of records".to_string())
        })?;
        let records: Vec<HistoricalListing> =
            items.iter().filter_map(HistoricalListing::from_json).collect();
        if records.len() < items.len() {
            warn!(
                dropped = items.len() - records.len(),
                kept = records.len(),
                "Dropped dataset entries that are not listing records"
            );
        }
        Ok(records)
    }

    /// Training-time feature vector: listing features plus the constants
    pub fn derive(&self, record: &HistoricalListing) -> FeatureVector {
        let mut features = self.deriver.derive(&record.attributes);
        features.push("season_month", self.config.season_month);
        features.push("supply_density", self.config.supply_density);
        features
    }

    /// Build the feature matrix and impute missing prices with the median
    pub fn build_training_set(&self, records: &[HistoricalListing]) -> Result<TrainingSet> {
        if records.is_empty() {
            return Err(PricingError::EmptyDataset("no listing records".to_string()));
        }

        let mut prices: Vec<f64> = records.iter().filter_map(|r| r.price).collect();
        if prices.is_empty() {
            return Err(PricingError::EmptyDataset(
                "no record carries a price".to_string(),
            ));
        }
        let fill = median(&mut prices);

        let features = Self::feature_names();
        let rows = records
            .iter()
            .map(|record| self.derive(record).project(&features))
            .collect();
        let targets: Vec<f64> = records.iter().map(|r| r.price.unwrap_or(fill)).collect();
        let imputed_prices = records.iter().filter(|r| r.price.is_none()).count();
        if imputed_prices > 0 {
            debug!(imputed_prices, median = fill, "Imputed missing prices with the median");
        }

        Ok(TrainingSet {
            features,
            rows,
            targets,
            imputed_prices,
        })
    }

    /// Shuffled (train, validation) row indices; at least one training row
    pub fn split(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let fraction = self.config.validation_fraction.clamp(0.0, 1.0);
        let n_validation = ((n as f64 * fraction).floor() as usize).min(n.saturating_sub(1));
        let validation = indices[..n_validation].to_vec();
        let train = indices[n_validation..].to_vec();
        (train, validation)
    }

    pub fn fit(&self, records: &[HistoricalListing]) -> Result<QuantileModelArtifact> {
        let started = Instant::now();
        let set = self.build_training_set(records)?;
        let (train_idx, validation_idx) = self.split(set.rows.len());

        let select = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            (
                idx.iter().map(|&i| set.rows[i].clone()).collect(),
                idx.iter().map(|&i| set.targets[i]).collect(),
            )
        };
        let (x_train, y_train) = select(&train_idx);
        let (x_val, y_val) = select(&validation_idx);

        info!(
            records = records.len(),
            n_train = x_train.len(),
            n_validation = x_val.len(),
            seed = self.config.seed,
            "Training quantile models"
        );

        let p10 = self.fit_quantile(&x_train, &y_train, self.config.low_quantile)?;
        let p50 = Regressor::from(RandomForest::fit(&x_train, &y_train, &self.config.forest)?);
        let p90 = self.fit_quantile(&x_train, &y_train, self.config.high_quantile)?;

        let mut report = evaluate(&p10, &p50, &p90, &x_val, &y_val, &self.config);
        report.n_train = x_train.len();
        report.imputed_prices = set.imputed_prices;
        report.duration_ms = started.elapsed().as_millis() as u64;

        let metadata = TrainingMetadata {
            trained_at: chrono::Utc::now(),
            seed: self.config.seed,
            validation_fraction: self.config.validation_fraction,
            reference_year: self.config.reference_year,
            report,
        };
        let artifact = QuantileModelArtifact::new(set.features, p10, p50, p90, metadata)?;
        Ok(artifact)
    }

    /// Parse and fit a JSON array of records
    pub fn fit_json(&self, dataset: &Value) -> Result<QuantileModelArtifact> {
        let records = Self::records_from_json(dataset)?;
        self.fit(&records)
    }

    fn fit_quantile(&self, x: &[Vec<f64>], y: &[f64], quantile: f64) -> Result<Regressor> {
        let config = QuantileConfig {
            alpha: self.config.quantile_alpha,
            ..QuantileConfig::new(quantile)
        };
        Ok(LinearQuantile::fit(x, y, &config)?.into())
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

fn evaluate(
    p10: &Regressor,
    p50: &Regressor,
    p90: &Regressor,
    x: &[Vec<f64>],
    y: &[f64],
    config: &TrainingConfig,
) -> TrainingReport {
    let mut report = TrainingReport {
        n_train: 0,
        n_validation: y.len(),
        imputed_prices: 0,
        pinball_p10: None,
        pinball_p50: None,
        pinball_p90: None,
        interval_coverage: None,
        duration_ms: 0,
    };
    if y.is_empty() {
        return report;
    }

    let predict = |m: &Regressor| -> Vec<f64> { x.iter().map(|row| m.predict_row(row)).collect() };
    let (low, mid, high) = (predict(p10), predict(p50), predict(p90));

    report.pinball_p10 = Some(pinball_loss(y, &low, config.low_quantile));
    report.pinball_p50 = Some(pinball_loss(y, &mid, 0.5));
    report.pinball_p90 = Some(pinball_loss(y, &high, config.high_quantile));
    let covered = y
        .iter()
        .zip(low.iter().zip(&high))
        .filter(|&(&t, (&l, &h))| l.min(h) <= t && t <= l.max(h))
        .count();
    report.interval_coverage = Some(covered as f64 / y.len() as f64);
    report
}

/// Mean pinball loss of predictions at quantile `q`
pub fn pinball_loss(targets: &[f64], predictions: &[f64], q: f64) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let total: f64 = targets
        .iter()
        .zip(predictions)
        .map(|(t, p)| {
            let r = t - p;
            if r >= 0.0 {
                q * r
            } else {
                (q - 1.0) * r
            }
        })
        .sum();
    total / targets.len() as f64
}

/// Median of a non-empty slice (mean of the two middle values when even)
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
