//! Request-time predictor selection
//!
//! The engine owns the process-wide model slot. An artifact is published
//! once (or swapped whole), and every request takes a cheap snapshot of the
//! current predictor, so concurrent requests never see a partially replaced
//! model and the artifact itself is never mutated.

use crate::artifact::{ArtifactStore, LoadedArtifact};
use crate::error::{PricingError, Result};
use crate::models::{ListingAttributes, PredictionResult};
use crate::observability::{PricingMetrics, StructuredLogger};
use crate::predictor::{ActivePredictor, HeuristicPredictor, LearnedPredictor, Predictor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

/// How the engine chooses between the learned and heuristic predictors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorMode {
    /// Learned when a model is published, heuristic otherwise
    #[default]
    Auto,
    /// Learned only; a missing model is an error
    Learned,
    /// Heuristic only
    Heuristic,
}

impl fmt::Display for PredictorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictorMode::Auto => "auto",
            PredictorMode::Learned => "learned",
            PredictorMode::Heuristic => "heuristic",
        };
        f.write_str(name)
    }
}

impl FromStr for PredictorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(PredictorMode::Auto),
            "learned" => Ok(PredictorMode::Learned),
            "heuristic" => Ok(PredictorMode::Heuristic),
            other => Err(format!(
                "unknown predictor mode '{}', expected auto, learned or heuristic",
                other
            )),
        }
    }
}

/// Publish-once, read-many holder of the active learned predictor
#[derive(Default)]
pub struct ModelSlot {
    current: RwLock<Option<Arc<LearnedPredictor>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published predictor as a whole
    pub fn publish(&self, predictor: LearnedPredictor) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::new(predictor));
    }

    pub fn snapshot(&self) -> Option<Arc<LearnedPredictor>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_published(&self) -> bool {
        self.snapshot().is_some()
    }
}

/// Serves predictions with the predictor the mode and slot allow
pub struct PricingEngine {
    mode: PredictorMode,
    slot: ModelSlot,
    heuristic: HeuristicPredictor,
    metrics: PricingMetrics,
    logger: StructuredLogger,
    prediction_count: AtomicU64,
    fallback_count: AtomicU64,
}

/// Per-engine request counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub predictions: u64,
    pub fallbacks: u64,
}

impl PricingEngine {
    pub fn new(mode: PredictorMode, reference_year: i64) -> Self {
        Self {
            mode,
            slot: ModelSlot::new(),
            heuristic: HeuristicPredictor::with_reference_year(reference_year),
            metrics: PricingMetrics::new(),
            logger: StructuredLogger::new("pricing-engine"),
            prediction_count: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn mode(&self) -> PredictorMode {
        self.mode
    }

    pub fn slot(&self) -> &ModelSlot {
        &self.slot
    }

    /// Validate and publish a loaded artifact
    pub fn publish(&self, loaded: LoadedArtifact) -> Result<()> {
        let version = loaded.version();
        let n_features = loaded.artifact.features().len();
        let predictor = LearnedPredictor::new(Arc::new(loaded.artifact), version.clone())?;
        self.slot.publish(predictor);

        self.metrics.set_model(&version, n_features);
        self.logger.log_model_loaded(&loaded.path, &version, n_features);
        Ok(())
    }

    /// Load an artifact from disk and publish it
    ///
    /// Schema mismatches are logged as rejected models before being returned,
    /// so they are never dropped silently even when the caller falls back.
    pub fn load_from(&self, path: &Path) -> Result<()> {
        let loaded = ArtifactStore::load(path).and_then(|loaded| self.publish(loaded));
        if let Err(err @ PricingError::SchemaMismatch(_)) = &loaded {
            self.logger.log_model_rejected(path, &err.to_string());
        }
        loaded
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            predictions: self.prediction_count.load(Ordering::Relaxed),
            fallbacks: self.fallback_count.load(Ordering::Relaxed),
        }
    }

    /// Pick the predictor for one request
    ///
    /// In auto mode a heuristic pick counts as one fallback, so call this
    /// once per request and hand the result to [`PricingEngine::predict_with`].
    pub fn select(&self) -> Result<ActivePredictor> {
        match self.mode {
            PredictorMode::Heuristic => Ok(ActivePredictor::Heuristic(self.heuristic)),
            PredictorMode::Learned => self
                .slot
                .snapshot()
                .map(ActivePredictor::Learned)
                .ok_or_else(|| {
                    PricingError::unavailable("<unpublished>", "no model has been published")
                }),
            PredictorMode::Auto => {
                let active = ActivePredictor::select(self.slot.snapshot(), self.heuristic);
                if !active.is_learned() {
                    self.fallback_count.fetch_add(1, Ordering::Relaxed);
                    self.metrics.inc_fallbacks();
                    debug!("No model published, serving heuristic prediction");
                }
                Ok(active)
            }
        }
    }

    pub fn predict(&self, attrs: &ListingAttributes) -> Result<PredictionResult> {
        let predictor = self.select()?;
        self.predict_with(&predictor, attrs)
    }

    /// Predict with an already selected predictor, recording metrics and logs
    pub fn predict_with(
        &self,
        predictor: &ActivePredictor,
        attrs: &ListingAttributes,
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = predictor.predict(attrs).inspect_err(|_| {
            self.metrics.inc_prediction_errors();
        })?;

        let elapsed = start.elapsed();
        self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
        self.metrics.inc_predictions(predictor.name());
        self.prediction_count.fetch_add(1, Ordering::Relaxed);
        self.logger.log_prediction(
            predictor.name(),
            &predictor.model_version(),
            &result,
            elapsed.as_micros(),
        );
        Ok(result)
    }

    /// Note that a fallback happened before the first request
    pub fn record_fallback(&self, reason: &str) {
        self.logger.log_fallback(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoricalListing;
    use crate::training::Trainer;
    use tempfile::TempDir;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<PredictorMode>().unwrap(), PredictorMode::Auto);
        assert_eq!("Learned".parse::<PredictorMode>().unwrap(), PredictorMode::Learned);
        assert_eq!("HEURISTIC".parse::<PredictorMode>().unwrap(), PredictorMode::Heuristic);
        assert!("neural".parse::<PredictorMode>().is_err());
        assert_eq!(PredictorMode::Learned.to_string(), "learned");
    }

    #[test]
    fn test_auto_without_model_uses_heuristic() {
        let engine = PricingEngine::new(PredictorMode::Auto, 2025);
        assert!(!engine.slot().is_published());
        let predictor = engine.select().unwrap();
        assert_eq!(predictor.name(), "heuristic");

        let attrs = ListingAttributes::default();
        let expected = HeuristicPredictor::new().predict(&attrs);
        assert_eq!(engine.predict(&attrs).unwrap(), expected);
    }

    #[test]
    fn test_auto_fallback_counted_once_per_request() {
        let engine = PricingEngine::new(PredictorMode::Auto, 2025);
        let before = PricingMetrics::new().fallbacks();

        engine.predict(&ListingAttributes::default()).unwrap();
        assert_eq!(engine.stats(), EngineStats { predictions: 1, fallbacks: 1 });

        let predictor = engine.select().unwrap();
        engine.predict_with(&predictor, &ListingAttributes::default()).unwrap();
        engine.predict_with(&predictor, &ListingAttributes::default()).unwrap();
        assert_eq!(engine.stats(), EngineStats { predictions: 3, fallbacks: 2 });

        // Other tests share the global registry, so only a lower bound holds
        assert!(PricingMetrics::new().fallbacks() >= before + 2);
    }

    #[test]
    fn test_heuristic_mode_is_not_a_fallback() {
        let engine = PricingEngine::new(PredictorMode::Heuristic, 2025);
        engine.predict(&ListingAttributes::default()).unwrap();
        assert_eq!(engine.stats(), EngineStats { predictions: 1, fallbacks: 0 });
    }

    #[test]
    fn test_learned_without_model_is_unavailable() {
        let engine = PricingEngine::new(PredictorMode::Learned, 2025);
        let err = engine.predict(&ListingAttributes::default()).unwrap_err();
        assert!(err.is_model_unavailable());
    }

    #[test]
    fn test_missing_artifact_file() {
        let engine = PricingEngine::new(PredictorMode::Auto, 2025);
        let err = engine.load_from(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(err.is_model_unavailable());
        assert!(!engine.slot().is_published());
    }

    fn single_listing_model(dir: &Path) -> std::path::PathBuf {
        let records = vec![HistoricalListing {
            attributes: ListingAttributes {
                year: 2019,
                km: 80_000.0,
                gear: "Auto".to_string(),
                ..ListingAttributes::default()
            },
            price: Some(150_000.0),
        }];
        let artifact = Trainer::default().fit(&records).unwrap();
        let path = dir.join("model_quantiles.json");
        ArtifactStore::save(&artifact, &path).unwrap();
        path
    }

    #[test]
    fn test_single_listing_model_reproduces_label() {
        let dir = TempDir::new().unwrap();
        let path = single_listing_model(dir.path());

        let engine = PricingEngine::new(PredictorMode::Learned, 2025);
        engine.load_from(&path).unwrap();
        assert!(engine.slot().is_published());
        assert_eq!(engine.select().unwrap().name(), "learned");

        let attrs = ListingAttributes {
            year: 2019,
            km: 80_000.0,
            gear: "Auto".to_string(),
            ..ListingAttributes::default()
        };
        let result = engine.predict(&attrs).unwrap();
        assert_eq!(result.p50, 150_000);
        assert!((result.p10 - 150_000).abs() <= 1, "p10 {}", result.p10);
        assert!((result.p90 - 150_000).abs() <= 1, "p90 {}", result.p90);
        assert!(result.p10 <= result.p50 && result.p50 <= result.p90);
        assert!(result.prob14 <= result.prob30);
    }

    #[test]
    fn test_unsupported_artifact_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = single_listing_model(dir.path());
        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(2);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        std::fs::remove_file(ArtifactStore::checksum_path(&path)).unwrap();

        let engine = PricingEngine::new(PredictorMode::Auto, 2025);
        let err = engine.load_from(&path).unwrap_err();
        assert!(matches!(err, PricingError::SchemaMismatch(_)));
        assert!(!engine.slot().is_published());
        assert_eq!(engine.select().unwrap().name(), "heuristic");
    }

    #[test]
    fn test_republish_swaps_whole_model() {
        let dir = TempDir::new().unwrap();
        let path = single_listing_model(dir.path());

        let engine = PricingEngine::new(PredictorMode::Auto, 2025);
        engine.load_from(&path).unwrap();
        let before = engine.slot().snapshot().unwrap();
        engine.load_from(&path).unwrap();
        let after = engine.slot().snapshot().unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.version(), after.version());
    }
}
