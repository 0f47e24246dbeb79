//! Quantile model artifacts and their on-disk store
//!
//! An artifact bundles the three fitted regressors with the ordered feature
//! schema they were trained on. The store writes it as JSON next to a
//! SHA-256 sidecar and validates both on load:
//! - read or checksum failures map to `ModelUnavailable`
//! - schema inconsistencies map to `SchemaMismatch`

use crate::error::{PricingError, Result};
use crate::regressor::Regressor;
use crate::training::TrainingReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Serialization format written by this crate
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Provenance of a fitted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub validation_fraction: f64,
    pub reference_year: i64,
    pub report: TrainingReport,
}

/// Three quantile regressors fitted on one feature schema
///
/// Fields are private so an artifact can only be obtained from the trainer
/// or the store, both of which validate the schema.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantileModelArtifact {
    format_version: u32,
    features: Vec<String>,
    p10: Regressor,
    p50: Regressor,
    p90: Regressor,
    metadata: TrainingMetadata,
}

impl QuantileModelArtifact {
    pub fn new(
        features: Vec<String>,
        p10: Regressor,
        p50: Regressor,
        p90: Regressor,
        metadata: TrainingMetadata,
    ) -> Result<Self> {
        let artifact = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            features,
            p10,
            p50,
            p90,
            metadata,
        };
        artifact.validate_schema()?;
        Ok(artifact)
    }

    /// Check that the feature list is usable and every regressor agrees
    /// with its width
    pub fn validate_schema(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PricingError::SchemaMismatch(format!(
                "unsupported artifact format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if self.features.is_empty() {
            return Err(PricingError::SchemaMismatch(
                "artifact declares no features".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.features.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(PricingError::SchemaMismatch(format!(
                "feature '{}' declared more than once",
                dup
            )));
        }
        for (label, regressor) in self.regressors() {
            if regressor.n_features() != self.features.len() {
                return Err(PricingError::SchemaMismatch(format!(
                    "{} regressor expects {} features but the artifact declares {}",
                    label,
                    regressor.n_features(),
                    self.features.len()
                )));
            }
        }
        Ok(())
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn p10(&self) -> &Regressor {
        &self.p10
    }

    pub fn p50(&self) -> &Regressor {
        &self.p50
    }

    pub fn p90(&self) -> &Regressor {
        &self.p90
    }

    pub fn regressors(&self) -> [(&'static str, &Regressor); 3] {
        [("p10", &self.p10), ("p50", &self.p50), ("p90", &self.p90)]
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PricingError::Training(format!("failed to serialize artifact: {}", e)))
    }
}

/// An artifact read from disk together with the checksum of its bytes
#[derive(Debug)]
pub struct LoadedArtifact {
    pub artifact: QuantileModelArtifact,
    pub path: PathBuf,
    pub checksum: String,
}

impl LoadedArtifact {
    /// Short version label derived from the checksum
    pub fn version(&self) -> String {
        self.checksum.chars().take(12).collect()
    }
}

/// Filesystem persistence for artifacts
pub struct ArtifactStore;

impl ArtifactStore {
    /// Path of the checksum sidecar for an artifact path
    pub fn checksum_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Write the artifact atomically and return its checksum
    pub fn save(artifact: &QuantileModelArtifact, path: &Path) -> Result<String> {
        let bytes = artifact.to_bytes()?;
        let checksum = compute_checksum(&bytes);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage(parent, e))?;
        }

        // Write to temp file first
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| storage(&temp_path, e))?;
        file.write_all(&bytes).map_err(|e| storage(&temp_path, e))?;
        file.sync_all().map_err(|e| storage(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| storage(path, e))?;

        let sidecar = Self::checksum_path(path);
        fs::write(&sidecar, format!("{}\n", checksum)).map_err(|e| storage(&sidecar, e))?;

        info!(
            path = %path.display(),
            size = bytes.len(),
            checksum = %checksum,
            "Artifact saved"
        );
        Ok(checksum)
    }

    /// Read, verify and validate an artifact
    pub fn load(path: &Path) -> Result<LoadedArtifact> {
        if !path.exists() {
            return Err(PricingError::unavailable(path, "artifact file not found"));
        }
        let bytes = fs::read(path).map_err(|e| {
            PricingError::unavailable(path, format!("failed to read artifact: {}", e))
        })?;
        let checksum = compute_checksum(&bytes);

        let sidecar = Self::checksum_path(path);
        match fs::read_to_string(&sidecar) {
            Ok(expected) => {
                let expected = expected.trim();
                if expected != checksum {
                    return Err(PricingError::unavailable(
                        path,
                        format!("checksum mismatch: expected {}, got {}", expected, checksum),
                    ));
                }
            }
            Err(_) => {
                warn!(path = %path.display(), "No checksum sidecar found, skipping verification");
            }
        }

        let artifact: QuantileModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            PricingError::unavailable(path, format!("failed to deserialize artifact: {}", e))
        })?;
        artifact.validate_schema()?;

        info!(
            path = %path.display(),
            checksum = %checksum,
            features = artifact.features().len(),
            "Artifact loaded"
        );
        Ok(LoadedArtifact {
            artifact,
            path: path.to_path_buf(),
            checksum,
        })
    }
}

fn storage(path: &Path, source: std::io::Error) -> PricingError {
    PricingError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
