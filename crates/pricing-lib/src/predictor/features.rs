//! Feature derivation shared by training and both predictors
//!
//! A single derivation path feeds the trainer, the learned predictor and the
//! heuristic predictor. The only intentional difference between call sites is
//! the transmission rule, expressed through [`GearMatch`]:
//!
//! - [`GearMatch::Strict`] accepts only `"auto"` (case-insensitive). This is
//!   the authoritative rule for anything that produces or consumes an
//!   artifact, since artifacts were trained with it.
//! - [`GearMatch::Lenient`] also accepts `"automatic"` and `"automat"`, and is
//!   used by the heuristic predictor.

use crate::models::ListingAttributes;
use serde::{Deserialize, Serialize};

/// Year that listing ages are measured against
pub const REFERENCE_YEAR: i64 = 2025;

/// Features produced for every listing, in emission order
pub const LISTING_FEATURES: [&str; 9] = [
    "km",
    "year",
    "age",
    "km_per_year",
    "equipment_len",
    "is_awd",
    "is_auto",
    "is_electric",
    "is_hybrid",
];

const LENIENT_AUTOMATIC: [&str; 3] = ["auto", "automatic", "automat"];

/// Transmission string matching rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GearMatch {
    Strict,
    Lenient,
}

impl GearMatch {
    pub fn is_automatic(self, gear: &str) -> bool {
        let gear = gear.to_lowercase();
        match self {
            GearMatch::Strict => gear == "auto",
            GearMatch::Lenient => LENIENT_AUTOMATIC.contains(&gear.as_str()),
        }
    }
}

/// Typed intermediate of feature derivation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedListing {
    pub km: f64,
    pub year: i64,
    /// Unclamped age; may be zero or negative for current/future model years
    pub age: i64,
    pub km_per_year: f64,
    pub equipment_len: u32,
    pub is_awd: bool,
    pub is_auto: bool,
    pub is_electric: bool,
    pub is_hybrid: bool,
}

impl DerivedListing {
    pub fn to_features(&self) -> FeatureVector {
        let mut features = FeatureVector::with_capacity(LISTING_FEATURES.len());
        features.push("km", self.km);
        features.push("year", self.year as f64);
        features.push("age", self.age as f64);
        features.push("km_per_year", self.km_per_year);
        features.push("equipment_len", self.equipment_len as f64);
        features.push("is_awd", flag(self.is_awd));
        features.push("is_auto", flag(self.is_auto));
        features.push("is_electric", flag(self.is_electric));
        features.push("is_hybrid", flag(self.is_hybrid));
        features
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Named numeric features, addressable by name, every value finite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(&'static str, f64)>,
}

impl FeatureVector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Set a feature. Non-finite values are stored as 0; an existing name is
    /// overwritten in place.
    pub fn push(&mut self, name: &'static str, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Align to a model schema: unknown features are dropped and
    /// schema features this vector lacks are filled with 0.
    pub fn project<S: AsRef<str>>(&self, schema: &[S]) -> Vec<f64> {
        schema
            .iter()
            .map(|name| self.get(name.as_ref()).unwrap_or(0.0))
            .collect()
    }

    /// Schema features this vector does not supply
    pub fn missing_from<'a, S: AsRef<str>>(&self, schema: &'a [S]) -> Vec<&'a str> {
        schema
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| self.get(name).is_none())
            .collect()
    }
}

/// Derives model features from raw listing attributes
#[derive(Debug, Clone, Copy)]
pub struct FeatureDeriver {
    reference_year: i64,
    gear_match: GearMatch,
}

impl FeatureDeriver {
    /// Strict transmission matching against [`REFERENCE_YEAR`]
    pub fn new() -> Self {
        Self {
            reference_year: REFERENCE_YEAR,
            gear_match: GearMatch::Strict,
        }
    }

    pub fn with_reference_year(mut self, reference_year: i64) -> Self {
        self.reference_year = reference_year;
        self
    }

    pub fn with_gear_match(mut self, gear_match: GearMatch) -> Self {
        self.gear_match = gear_match;
        self
    }

    pub fn reference_year(&self) -> i64 {
        self.reference_year
    }

    pub fn gear_match(&self) -> GearMatch {
        self.gear_match
    }

    pub fn derive_listing(&self, attrs: &ListingAttributes) -> DerivedListing {
        let age = self.reference_year.saturating_sub(attrs.year);
        DerivedListing {
            km: attrs.km,
            year: attrs.year,
            age,
            km_per_year: attrs.km / age.max(1) as f64,
            equipment_len: attrs.equipment_len,
            is_awd: attrs.driveline == "AWD",
            is_auto: self.gear_match.is_automatic(&attrs.gear),
            is_electric: attrs.fuel_type == "Electric",
            is_hybrid: attrs.fuel_type.contains("Hybrid"),
        }
    }

    pub fn derive(&self, attrs: &ListingAttributes) -> FeatureVector {
        self.derive_listing(attrs).to_features()
    }
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self::new()
    }
}
