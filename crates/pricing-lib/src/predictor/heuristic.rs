//! Rule-based predictor used when no trained artifact is available
//!
//! Prices start from an age-banded base value and are adjusted for
//! mileage relative to an expected 12 000 km per year, transmission, fuel
//! type and equipment. Quantiles are fixed multiples of the estimate, so
//! they are ordered by construction.

use super::features::{FeatureDeriver, GearMatch};
use super::output::{prob30_from, round_probability};
use super::Predictor;
use crate::error::Result;
use crate::models::{ListingAttributes, PredictionResult};

/// Age bands as (maximum age, base price)
const AGE_BANDS: [(i64, f64); 5] = [
    (1, 350_000.0),
    (3, 250_000.0),
    (5, 180_000.0),
    (7, 140_000.0),
    (10, 100_000.0),
];
const OLDEST_BAND_PRICE: f64 = 70_000.0;

const EXPECTED_KM_PER_YEAR: f64 = 12_000.0;
const KM_PENALTY_RATE: f64 = 0.5;
const KM_PENALTY_CAP: f64 = 0.30;
const KM_BONUS_RATE: f64 = 0.3;
const KM_BONUS_CAP: f64 = 0.15;

const AUTOMATIC_PREMIUM: f64 = 0.05;
const EQUIPMENT_ITEM_VALUE: f64 = 2_000.0;
const EQUIPMENT_CAP: f64 = 0.10;

pub const MIN_PRICE: f64 = 30_000.0;
pub const MAX_PRICE: f64 = 500_000.0;
pub const P10_FACTOR: f64 = 0.87;
pub const P90_FACTOR: f64 = 1.13;

const PROB30_UPLIFT: f64 = 0.20;

/// Base price for a listing of the given age
pub fn base_price(age: i64) -> f64 {
    AGE_BANDS
        .iter()
        .find(|(max_age, _)| age <= *max_age)
        .map(|(_, price)| *price)
        .unwrap_or(OLDEST_BAND_PRICE)
}

/// Fuel premium as a fraction of the base price; unknown labels get none
fn fuel_premium(fuel_type: &str) -> f64 {
    match fuel_type {
        "Electric" => 0.20,
        "Hybrid" => 0.10,
        "Diesel" => 0.02,
        // "Petrol" and its Norwegian label "Bensin" are the baseline
        _ => 0.0,
    }
}

/// Heuristic predictor requiring no trained state
#[derive(Debug, Clone, Copy)]
pub struct HeuristicPredictor {
    deriver: FeatureDeriver,
}

impl HeuristicPredictor {
    pub fn new() -> Self {
        Self {
            deriver: FeatureDeriver::new().with_gear_match(GearMatch::Lenient),
        }
    }

    pub fn with_reference_year(reference_year: i64) -> Self {
        Self {
            deriver: FeatureDeriver::new()
                .with_reference_year(reference_year)
                .with_gear_match(GearMatch::Lenient),
        }
    }

    /// Point estimate of the listing price, clamped to the market range
    pub fn estimate_price(&self, attrs: &ListingAttributes) -> f64 {
        let listing = self.deriver.derive_listing(attrs);
        let base = base_price(listing.age);

        let expected_km = listing.age as f64 * EXPECTED_KM_PER_YEAR;
        let km_diff = listing.km - expected_km;
        // Positive is a penalty, negative a bonus
        let km_adjustment = if km_diff > 0.0 {
            (km_diff * KM_PENALTY_RATE).min(base * KM_PENALTY_CAP)
        } else {
            -(km_diff.abs() * KM_BONUS_RATE).min(base * KM_BONUS_CAP)
        };

        let transmission = if listing.is_auto {
            base * AUTOMATIC_PREMIUM
        } else {
            0.0
        };
        let fuel = base * fuel_premium(&attrs.fuel_type);
        let equipment =
            (listing.equipment_len as f64 * EQUIPMENT_ITEM_VALUE).min(base * EQUIPMENT_CAP);

        (base - km_adjustment + transmission + fuel + equipment).clamp(MIN_PRICE, MAX_PRICE)
    }

    pub fn predict(&self, attrs: &ListingAttributes) -> PredictionResult {
        let estimate = self.estimate_price(attrs);
        let age = self.deriver.derive_listing(attrs).age as f64;

        let km_factor = (1.0 - attrs.km / 250_000.0).clamp(0.2, 0.9);
        let age_factor = (1.0 - age / 15.0).clamp(0.2, 0.9);
        let prob14 = round_probability(0.3 + km_factor * 0.25 + age_factor * 0.25);

        PredictionResult {
            p10: (estimate * P10_FACTOR).floor() as i64,
            p50: estimate.floor() as i64,
            p90: (estimate * P90_FACTOR).floor() as i64,
            prob14,
            prob30: round_probability(prob30_from(prob14, PROB30_UPLIFT)),
        }
    }
}

impl Default for HeuristicPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for HeuristicPredictor {
    fn predict(&self, attrs: &ListingAttributes) -> Result<PredictionResult> {
        Ok(HeuristicPredictor::predict(self, attrs))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn model_version(&self) -> String {
        "heuristic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REFERENCE_YEAR_FOR_TESTS: i64 = 2025;

    fn attrs(value: serde_json::Value) -> ListingAttributes {
        ListingAttributes::from_json(&value)
    }

    fn assert_bounds(result: &PredictionResult) {
        assert!(result.p10 as f64 >= (MIN_PRICE * P10_FACTOR).floor());
        assert!(result.p10 <= result.p50);
        assert!(result.p50 <= result.p90);
        assert!(result.p90 as f64 <= MAX_PRICE * P90_FACTOR);
        assert!(result.prob14 >= 0.15);
        assert!(result.prob14 <= result.prob30);
        assert!(result.prob30 <= 0.95);
    }

    #[test]
    fn test_base_price_bands() {
        assert_eq!(base_price(-3), 350_000.0);
        assert_eq!(base_price(1), 350_000.0);
        assert_eq!(base_price(2), 250_000.0);
        assert_eq!(base_price(3), 250_000.0);
        assert_eq!(base_price(5), 180_000.0);
        assert_eq!(base_price(7), 140_000.0);
        assert_eq!(base_price(10), 100_000.0);
        assert_eq!(base_price(11), 70_000.0);
    }

    #[test]
    fn test_new_electric_awd_listing() {
        let predictor = HeuristicPredictor::new();
        let listing = attrs(json!({
            "year": 2022,
            "km": 20000,
            "gear": "Automatic",
            "driveline": "AWD",
            "fuel_type": "Electric",
            "equipment_len": 10
        }));

        // 250000 base + 4800 km bonus + 12500 auto + 50000 electric + 20000 equipment
        let estimate = predictor.estimate_price(&listing);
        assert!((estimate - 337_300.0).abs() < 1e-6, "estimate was {}", estimate);

        let result = predictor.predict(&listing);
        assert_eq!(result.p50, 337_300);
        assert!((result.p10 - 293_451).abs() <= 1);
        assert!((result.p90 - 381_149).abs() <= 1);
        let ratio = result.p90 as f64 / result.p10 as f64;
        assert!((ratio - P90_FACTOR / P10_FACTOR).abs() < 1e-4);
        assert!((result.prob14 - 0.725).abs() <= 0.0051);
        assert_bounds(&result);
    }

    #[test]
    fn test_old_high_mileage_listing() {
        let predictor = HeuristicPredictor::new();
        let listing = attrs(json!({
            "year": 2010,
            "km": 300000,
            "gear": "Manual",
            "fuel_type": "Petrol"
        }));

        // 70000 base with the penalty capped at 30%
        let result = predictor.predict(&listing);
        assert_eq!(result.p50, 49_000);
        assert!(result.p50 as f64 >= MIN_PRICE);
        assert_eq!(result.prob14, 0.4);
        assert_eq!(result.prob30, 0.6);
        assert_bounds(&result);
    }

    #[test]
    fn test_penalty_cap_bounds_oldest_band() {
        let predictor = HeuristicPredictor::with_reference_year(2060);
        let listing = attrs(json!({ "year": 1990, "km": 900000 }));
        let result = predictor.predict(&listing);
        // 70000 base less the full 30% penalty
        assert_eq!(result.p50, 49_000);
        assert_bounds(&result);
    }

    #[test]
    fn test_price_ceiling_applies() {
        let predictor = HeuristicPredictor::new();
        let listing = attrs(json!({
            "year": 2025,
            "km": 0,
            "gear": "auto",
            "fuel_type": "Electric",
            "equipment_len": 100
        }));
        // 350000 + 17500 + 70000 + 35000 = 472500, still under the ceiling
        assert!(predictor.estimate_price(&listing) <= MAX_PRICE);
        assert_bounds(&predictor.predict(&listing));
    }

    #[test]
    fn test_lenient_transmission_premium() {
        let predictor = HeuristicPredictor::new();
        let manual = predictor.estimate_price(&attrs(json!({ "gear": "Manual" })));
        for gear in ["auto", "Automatic", "AUTOMAT"] {
            let auto = predictor.estimate_price(&attrs(json!({ "gear": gear })));
            assert!((auto - manual - 140_000.0 * 0.05).abs() < 1e-6, "gear {}", gear);
        }
    }

    #[test]
    fn test_fuel_table() {
        let predictor = HeuristicPredictor::new();
        let petrol = predictor.estimate_price(&attrs(json!({ "fuel_type": "Petrol" })));
        let bensin = predictor.estimate_price(&attrs(json!({ "fuel_type": "Bensin" })));
        let diesel = predictor.estimate_price(&attrs(json!({ "fuel_type": "Diesel" })));
        let plugin = predictor.estimate_price(&attrs(json!({ "fuel_type": "Plug-in Hybrid" })));
        assert_eq!(petrol, bensin);
        assert_eq!(petrol, plugin);
        assert!((diesel - petrol - 140_000.0 * 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_empty_listing_uses_defaults() {
        let predictor = HeuristicPredictor::new();
        let result = predictor.predict(&attrs(json!({})));
        // age 7: base 140000, expected 84000 km, 16000 over => 8000 penalty
        assert_eq!(result.p50, 132_000);
        assert_bounds(&result);
    }

    #[test]
    fn test_younger_never_cheaper_across_bands() {
        let predictor = HeuristicPredictor::new();

        // At expected mileage the estimate is the band price itself
        let mut previous = 0;
        for year in 1995..=REFERENCE_YEAR_FOR_TESTS {
            let age = REFERENCE_YEAR_FOR_TESTS - year;
            let km = (age * 12_000) as f64;
            let result = predictor.predict(&attrs(json!({ "year": year, "km": km })));
            assert!(result.p50 >= previous, "year {} dropped below {}", year, previous);
            previous = result.p50;
        }

        // Band boundaries at a fixed mileage
        let boundary_years = [2014, 2015, 2018, 2020, 2022, 2024];
        let prices: Vec<i64> = boundary_years
            .iter()
            .map(|year| predictor.predict(&attrs(json!({ "year": year, "km": 50000 }))).p50)
            .collect();
        assert!(prices.windows(2).all(|w| w[0] < w[1]), "prices {:?}", prices);
    }

    #[test]
    fn test_bounds_over_grid() {
        let predictor = HeuristicPredictor::new();
        for year in [1980, 2000, 2010, 2015, 2020, 2024, 2025, 2030] {
            for km in [0.0, 10_000.0, 120_000.0, 250_000.0, 1_000_000.0] {
                for fuel in ["Petrol", "Electric", "Hybrid", "Diesel"] {
                    let listing = attrs(json!({
                        "year": year,
                        "km": km,
                        "fuel_type": fuel,
                        "gear": "Automatic",
                        "equipment_len": 50
                    }));
                    assert_bounds(&predictor.predict(&listing));
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let predictor = HeuristicPredictor::new();
        let listing = attrs(json!({ "year": 2017, "km": 87000, "fuel_type": "Diesel" }));
        assert_eq!(predictor.predict(&listing), predictor.predict(&listing));
    }
}
