//! Core data models for the pricing core

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const DEFAULT_YEAR: i64 = 2018;
pub const DEFAULT_KM: f64 = 100_000.0;
pub const DEFAULT_GEAR: &str = "Manual";
pub const DEFAULT_DRIVELINE: &str = "FWD";
pub const DEFAULT_FUEL_TYPE: &str = "Petrol";

/// Raw attributes of a used-vehicle listing
///
/// Every field has a default. Parsing never fails: absent keys and values of
/// the wrong shape resolve to the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingAttributes {
    pub year: i64,
    pub km: f64,
    pub gear: String,
    pub driveline: String,
    pub fuel_type: String,
    pub equipment_len: u32,
}

impl Default for ListingAttributes {
    fn default() -> Self {
        Self {
            year: DEFAULT_YEAR,
            km: DEFAULT_KM,
            gear: DEFAULT_GEAR.to_string(),
            driveline: DEFAULT_DRIVELINE.to_string(),
            fuel_type: DEFAULT_FUEL_TYPE.to_string(),
            equipment_len: 0,
        }
    }
}

impl ListingAttributes {
    /// Build attributes from an arbitrary JSON value
    ///
    /// Anything other than an object yields the all-default listing.
    pub fn from_json(value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self::from_map(map),
            None => {
                debug!(
                    event = "input_defaulted",
                    "Listing payload is not an object, using defaults"
                );
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::default();

        let year = int_field(map, "year").unwrap_or(defaults.year);
        let km = match number_field(map, "km") {
            Some(km) if km >= 0.0 => km,
            Some(_) => {
                defaulted("km");
                defaults.km
            }
            None => defaults.km,
        };

        Self {
            year,
            km,
            gear: string_field(map, "gear").unwrap_or(defaults.gear),
            driveline: string_field(map, "driveline").unwrap_or(defaults.driveline),
            fuel_type: string_field(map, "fuel_type").unwrap_or(defaults.fuel_type),
            equipment_len: equipment_count(map),
        }
    }
}

impl<'de> Deserialize<'de> for ListingAttributes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// A historical listing used for training, labelled with its asking price
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalListing {
    pub attributes: ListingAttributes,
    pub price: Option<f64>,
}

impl HistoricalListing {
    /// Parse a training record. Returns `None` for records that are not
    /// JSON objects; missing or unparseable prices become `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            attributes: ListingAttributes::from_map(map),
            price: number_field(map, "price"),
        })
    }
}

/// Price quantiles and sale probabilities for one listing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub p10: i64,
    pub p50: i64,
    pub p90: i64,
    pub prob14: f64,
    pub prob30: f64,
}

fn defaulted(field: &str) {
    debug!(event = "input_defaulted", field = %field, "Listing attribute invalid, using default");
}

fn int_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = map.get(key)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    };
    if parsed.is_none() && !value.is_null() {
        defaulted(key);
    }
    parsed
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = map.get(key)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite());
    if parsed.is_none() && !value.is_null() {
        defaulted(key);
    }
    parsed
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        _ => {
            defaulted(key);
            None
        }
    }
}

fn equipment_count(map: &Map<String, Value>) -> u32 {
    if let Some(items) = map.get("equipment").and_then(Value::as_array) {
        return u32::try_from(items.len()).unwrap_or(u32::MAX);
    }
    int_field(map, "equipment_len")
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}
