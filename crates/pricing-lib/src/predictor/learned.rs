//! Inference against a trained quantile model artifact
//!
//! Features are derived with the strict transmission rule the artifacts are
//! trained with, projected onto the artifact schema and fed to the three
//! regressors. Sale probabilities blend the width of the predicted band
//! with mileage and model year.

use super::features::FeatureDeriver;
use super::output::{order_quantiles, prob30_from, round_probability};
use super::Predictor;
use crate::artifact::QuantileModelArtifact;
use crate::error::Result;
use crate::models::{ListingAttributes, PredictionResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 5;

const PROB30_UPLIFT: f64 = 0.15;

/// Predictor backed by a published, read-only artifact
pub struct LearnedPredictor {
    artifact: Arc<QuantileModelArtifact>,
    version: String,
    deriver: FeatureDeriver,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl LearnedPredictor {
    /// Wrap an artifact, validating its schema first
    pub fn new(artifact: Arc<QuantileModelArtifact>, version: impl Into<String>) -> Result<Self> {
        artifact.validate_schema()?;
        let deriver =
            FeatureDeriver::new().with_reference_year(artifact.metadata().reference_year);
        Ok(Self {
            artifact,
            version: version.into(),
            deriver,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    pub fn artifact(&self) -> &Arc<QuantileModelArtifact> {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Raw regressor outputs for one listing, in p10/p50/p90 order
    pub fn raw_quantiles(&self, attrs: &ListingAttributes) -> [f64; 3] {
        let features = self.deriver.derive(attrs);
        let schema = self.artifact.features();
        let row = features.project(schema);
        let missing = features.missing_from(schema);
        if !missing.is_empty() {
            debug!(missing = ?missing, "Filled features absent from the request with 0");
        }

        [
            self.artifact.p10().predict_row(&row),
            self.artifact.p50().predict_row(&row),
            self.artifact.p90().predict_row(&row),
        ]
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

/// 14- and 30-day sale probabilities for a predicted band
pub fn sale_probability(band: i64, km: f64, year: i64) -> (f64, f64) {
    let band_factor = (1.0 - band as f64 / 500_000.0).clamp(0.1, 0.9);
    let km_factor = (1.0 - km / 300_000.0).clamp(0.1, 0.9);
    let age_factor = (year.saturating_sub(2010) as f64 / 15.0).clamp(0.1, 0.9);

    let prob14 = (0.3 + band_factor * 0.3 + km_factor * 0.2 + age_factor * 0.2).clamp(0.15, 0.85);
    let prob30 = prob30_from(prob14, PROB30_UPLIFT);
    (round_probability(prob14), round_probability(prob30))
}

impl Predictor for LearnedPredictor {
    fn predict(&self, attrs: &ListingAttributes) -> Result<PredictionResult> {
        let start = Instant::now();

        let [p10, p50, p90] = order_quantiles(self.raw_quantiles(attrs))?;
        let band = p90.saturating_sub(p10).max(1);
        let (prob14, prob30) = sale_probability(band, attrs.km, attrs.year);

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        Ok(PredictionResult {
            p10,
            p50,
            p90,
            prob14,
            prob30,
        })
    }

    fn name(&self) -> &'static str {
        "learned"
    }

    fn model_version(&self) -> String {
        self.version.clone()
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TrainingMetadata;
    use crate::error::PricingError;
    use crate::models::HistoricalListing;
    use crate::regressor::{ForestConfig, LinearQuantile, QuantileConfig, RandomForest, Regressor};
    use crate::training::Trainer;
    use serde_json::json;

    fn trained_artifact() -> QuantileModelArtifact {
        let records: Vec<HistoricalListing> = (0..30)
            .map(|i| {
                let year = 2010 + (i % 15) as i64;
                let km = 20_000.0 + 7_500.0 * i as f64;
                HistoricalListing {
                    attributes: ListingAttributes {
                        year,
                        km,
                        gear: if i % 2 == 0 { "Auto" } else { "Manual" }.to_string(),
                        ..ListingAttributes::default()
                    },
                    price: Some(80_000.0 + 15_000.0 * (year - 2010) as f64 - 0.2 * km),
                }
            })
            .collect();
        Trainer::default().fit(&records).unwrap()
    }

    fn metadata() -> TrainingMetadata {
        trained_artifact().metadata().clone()
    }

    fn linear(coefficients: [f64; 2]) -> Regressor {
        let value = json!({
            "kind": "linear_quantile",
            "quantile": 0.5,
            "means": [0.0, 0.0],
            "scales": [1.0, 1.0],
            "intercept": 0.0,
            "coefficients": coefficients,
        });
        serde_json::from_value(value).unwrap()
    }

    fn km_year_predictor(p10: Regressor, p50: Regressor, p90: Regressor) -> LearnedPredictor {
        let features = vec!["km".to_string(), "year".to_string()];
        let artifact = QuantileModelArtifact::new(features, p10, p50, p90, metadata()).unwrap();
        LearnedPredictor::new(Arc::new(artifact), "km-year").unwrap()
    }

    fn constant_fit(y: f64) -> (Vec<Vec<f64>>, Vec<f64>) {
        (vec![vec![5.0, 5.0], vec![5.0, 5.0]], vec![y, y])
    }

    #[test]
    fn test_sale_probability_bounds() {
        for band in [1, 10_000, 100_000, 1_000_000] {
            for km in [0.0, 50_000.0, 300_000.0, 900_000.0] {
                for year in [1990, 2010, 2018, 2025, 2040] {
                    let (p14, p30) = sale_probability(band, km, year);
                    assert!((0.15..=0.85).contains(&p14), "prob14 {}", p14);
                    assert!(p14 <= p30 && p30 <= 0.95, "prob30 {} prob14 {}", p30, p14);
                }
            }
        }
    }

    #[test]
    fn test_sale_probability_narrow_band_new_car() {
        // 0.3 + 0.9*0.3 + 0.9*0.2 + 0.9*0.2 = 0.93, clamped to 0.85
        let (p14, p30) = sale_probability(1, 0.0, 2025);
        assert_eq!(p14, 0.85);
        assert_eq!(p30, 0.95);
    }

    #[test]
    fn test_sale_probability_blend() {
        // band 300000: 0.4, km 240000: 0.2, year 2013: 0.2
        let (p14, p30) = sale_probability(300_000, 240_000.0, 2013);
        assert!((p14 - 0.5).abs() < 1e-9, "prob14 {}", p14);
        assert!((p30 - 0.65).abs() < 1e-9, "prob30 {}", p30);

        // Default listing with a 60000 wide band lands near 0.80
        let (p14, p30) = sale_probability(60_000, 100_000.0, 2018);
        assert!((p14 - 0.8).abs() < 1e-9, "prob14 {}", p14);
        assert!((p30 - 0.95).abs() < 1e-9, "prob30 {}", p30);
    }

    #[test]
    fn test_sale_probability_extreme_inputs() {
        let (p14, p30) = sale_probability(i64::MAX, 1e300, i64::MIN);
        assert!((0.15..=0.85).contains(&p14), "prob14 {}", p14);
        assert!(p14 <= p30 && p30 <= 0.95);

        let (p14, _) = sale_probability(1, 0.0, i64::MAX);
        assert_eq!(p14, 0.85);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let predictor = LearnedPredictor::new(Arc::new(trained_artifact()), "v1").unwrap();
        let attrs = ListingAttributes {
            year: 2018,
            km: 90_000.0,
            gear: "Auto".to_string(),
            ..ListingAttributes::default()
        };

        let first = predictor.predict(&attrs).unwrap();
        let second = predictor.predict(&attrs).unwrap();
        assert_eq!(first, second);
        assert!(first.p10 <= first.p50 && first.p50 <= first.p90);
        assert!(first.prob14 <= first.prob30);
        assert_eq!(predictor.stats().total_inferences, 2);
        assert_eq!(predictor.model_version(), "v1");
    }

    #[test]
    fn test_extreme_listing_does_not_panic() {
        let predictor = LearnedPredictor::new(Arc::new(trained_artifact()), "v1").unwrap();
        for payload in [
            json!({"km": 1e300}),
            json!({"year": -1e20}),
            json!({"km": 1e300, "year": 1e20}),
        ] {
            let attrs = ListingAttributes::from_json(&payload);
            match predictor.predict(&attrs) {
                Ok(result) => {
                    assert!(result.p10 <= result.p50 && result.p50 <= result.p90);
                    assert!((0.15..=0.85).contains(&result.prob14));
                    assert!(result.prob14 <= result.prob30 && result.prob30 <= 0.95);
                }
                Err(err) => assert!(matches!(err, PricingError::Prediction(_)), "{}", err),
            }
        }
    }

    #[test]
    fn test_unrepresentable_estimate_is_prediction_error() {
        let predictor = km_year_predictor(
            linear([1.0, 0.0]),
            linear([1e300, 0.0]),
            linear([1.0, 0.0]),
        );
        let attrs = ListingAttributes {
            km: 50_000.0,
            ..ListingAttributes::default()
        };
        let err = predictor.predict(&attrs).unwrap_err();
        assert!(matches!(err, PricingError::Prediction(_)));
    }

    #[test]
    fn test_nan_estimate_is_prediction_error() {
        let predictor = km_year_predictor(
            linear([1e308, -1e308]),
            linear([1.0, 0.0]),
            linear([1.0, 0.0]),
        );
        let attrs = ListingAttributes {
            km: 50_000.0,
            year: 2018,
            ..ListingAttributes::default()
        };
        assert!(predictor.raw_quantiles(&attrs)[0].is_nan());
        let err = predictor.predict(&attrs).unwrap_err();
        assert!(matches!(err, PricingError::Prediction(_)));
    }

    #[test]
    fn test_crossing_regressors_are_reordered() {
        let (x, high) = constant_fit(300_000.0);
        let p10 = LinearQuantile::fit(&x, &high, &QuantileConfig::new(0.5)).unwrap();
        let (x, mid) = constant_fit(200_000.0);
        let p50 = RandomForest::fit(&x, &mid, &ForestConfig::default()).unwrap();
        let (x, low) = constant_fit(100_000.0);
        let p90 = LinearQuantile::fit(&x, &low, &QuantileConfig::new(0.5)).unwrap();

        let predictor = km_year_predictor(p10.into(), p50.into(), p90.into());
        let attrs = ListingAttributes::default();
        let raw = predictor.raw_quantiles(&attrs);
        assert!(raw[0] > raw[2], "fixture should cross: {:?}", raw);

        let result = predictor.predict(&attrs).unwrap();
        assert!(result.p10 <= result.p50 && result.p50 <= result.p90);
        assert_eq!(result.p50, 200_000);
        assert!((result.p10 - 100_000).abs() <= 1, "p10 {}", result.p10);
        assert!((result.p90 - 300_000).abs() <= 1, "p90 {}", result.p90);
    }
}
