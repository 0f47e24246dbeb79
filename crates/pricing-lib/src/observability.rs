//! Observability infrastructure for the pricing core
//!
//! Provides:
//! - Prometheus metrics (prediction latency, predictions per predictor,
//!   heuristic fallbacks, prediction errors, loaded model)
//! - Structured JSON logging with tracing

use crate::models::PredictionResult;
use crate::training::TrainingReport;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PricingMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct PricingMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    fallbacks_total: IntCounter,
    prediction_errors_total: IntCounter,
    model_info: GaugeVec,
}

impl PricingMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "vehicle_pricing_prediction_latency_seconds",
                "Time spent producing a price prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "vehicle_pricing_predictions_total",
                "Predictions served, by predictor",
                &["predictor"]
            )
            .expect("Failed to register predictions_total"),

            fallbacks_total: register_int_counter!(
                "vehicle_pricing_fallbacks_total",
                "Requests served by the heuristic because no model was available"
            )
            .expect("Failed to register fallbacks_total"),

            prediction_errors_total: register_int_counter!(
                "vehicle_pricing_prediction_errors_total",
                "Predictions that failed"
            )
            .expect("Failed to register prediction_errors_total"),

            model_info: register_gauge_vec!(
                "vehicle_pricing_model_info",
                "Information about the currently published quantile model",
                &["version", "features"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Pricing metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct PricingMetrics {
    _private: (),
}

impl Default for PricingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PricingMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PricingMetricsInner {
        GLOBAL_METRICS.get_or_init(PricingMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, predictor: &str) {
        self.inner()
            .predictions_total
            .with_label_values(&[predictor])
            .inc();
    }

    pub fn predictions(&self, predictor: &str) -> u64 {
        self.inner()
            .predictions_total
            .with_label_values(&[predictor])
            .get()
    }

    pub fn inc_fallbacks(&self) {
        self.inner().fallbacks_total.inc();
    }

    pub fn fallbacks(&self) -> u64 {
        self.inner().fallbacks_total.get()
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors_total.inc();
    }

    /// Update published model info
    pub fn set_model(&self, version: &str, n_features: usize) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[version, &n_features.to_string()])
            .set(1.0);
    }
}

/// Structured logger for pricing events
///
/// Provides consistent JSON-formatted logging for predictions, fallbacks,
/// model loading and training.
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_prediction(
        &self,
        predictor: &str,
        model_version: &str,
        result: &PredictionResult,
        elapsed_us: u128,
    ) {
        info!(
            event = "prediction_generated",
            component = %self.component,
            predictor = %predictor,
            model_version = %model_version,
            p10 = result.p10,
            p50 = result.p50,
            p90 = result.p90,
            prob14 = result.prob14,
            prob30 = result.prob30,
            elapsed_us = elapsed_us as u64,
            "Generated price prediction"
        );
    }

    pub fn log_fallback(&self, reason: &str) {
        warn!(
            event = "predictor_fallback",
            component = %self.component,
            reason = %reason,
            "No quantile model available, using heuristic predictor"
        );
    }

    pub fn log_model_loaded(&self, path: &Path, version: &str, n_features: usize) {
        info!(
            event = "model_loaded",
            component = %self.component,
            path = %path.display(),
            model_version = %version,
            features = n_features,
            "Quantile model published"
        );
    }

    /// An artifact exists but cannot be used and has to be retrained
    pub fn log_model_rejected(&self, path: &Path, reason: &str) {
        error!(
            event = "model_rejected",
            component = %self.component,
            path = %path.display(),
            reason = %reason,
            "Quantile model rejected, retraining required"
        );
    }

    pub fn log_training_completed(&self, output: &Path, checksum: &str, report: &TrainingReport) {
        info!(
            event = "training_completed",
            component = %self.component,
            output = %output.display(),
            checksum = %checksum,
            n_train = report.n_train,
            n_validation = report.n_validation,
            imputed_prices = report.imputed_prices,
            pinball_p10 = ?report.pinball_p10,
            pinball_p50 = ?report.pinball_p50,
            pinball_p90 = ?report.pinball_p90,
            interval_coverage = ?report.interval_coverage,
            duration_ms = report.duration_ms,
            "Quantile model trained"
        );
    }

    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "pricer_started",
            component = %self.component,
            version = %version,
            mode = %mode,
            "Pricer started"
        );
    }
}
