//! Listing prediction command

use anyhow::{Context, Result};
use colored::Colorize;
use pricing_lib::{
    ListingAttributes, PredictionResult, Predictor, PredictorMode, PricingEngine, PricingError,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tabled::Tabled;
use tracing::debug;

use crate::output::{
    color_probability, format_price, print_info, print_json, print_table, print_warning,
    OutputFormat,
};

/// Listing attributes given as command-line flags
#[derive(Debug, Default)]
pub struct ListingFields {
    pub year: Option<i64>,
    pub km: Option<f64>,
    pub gear: Option<String>,
    pub driveline: Option<String>,
    pub fuel_type: Option<String>,
    pub equipment_len: Option<u32>,
}

impl ListingFields {
    /// Request payload holding only the flags that were given
    fn to_request(&self) -> Value {
        let mut map = Map::new();
        if let Some(year) = self.year {
            map.insert("year".into(), year.into());
        }
        if let Some(km) = self.km {
            map.insert("km".into(), km.into());
        }
        if let Some(gear) = &self.gear {
            map.insert("gear".into(), gear.as_str().into());
        }
        if let Some(driveline) = &self.driveline {
            map.insert("driveline".into(), driveline.as_str().into());
        }
        if let Some(fuel_type) = &self.fuel_type {
            map.insert("fuel_type".into(), fuel_type.as_str().into());
        }
        if let Some(equipment_len) = self.equipment_len {
            map.insert("equipment_len".into(), equipment_len.into());
        }
        Value::Object(map)
    }
}

/// Row for the price quantile table
#[derive(Tabled)]
struct QuantileRow {
    #[tabled(rename = "Quantile")]
    quantile: &'static str,
    #[tabled(rename = "Price")]
    price: String,
}

#[derive(Serialize)]
struct PredictionOutput<'a> {
    predictor: &'static str,
    model_version: String,
    #[serde(flatten)]
    result: &'a PredictionResult,
}

/// Resolve listing attributes from an input file or flags
pub fn load_listing(input: Option<&Path>, fields: ListingFields) -> Result<ListingAttributes> {
    let request = match input {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read listing {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Listing {} is not valid JSON", path.display()))?
        }
        None => fields.to_request(),
    };
    let attrs = ListingAttributes::from_json(&request);
    debug!(?attrs, "Resolved listing attributes");
    Ok(attrs)
}

/// Price one listing with the learned model, or the heuristic as fallback
pub fn predict_listing(
    attrs: &ListingAttributes,
    model: &Path,
    heuristic: bool,
    reference_year: i64,
    format: OutputFormat,
) -> Result<()> {
    let mode = if heuristic {
        PredictorMode::Heuristic
    } else {
        PredictorMode::Auto
    };
    let engine = PricingEngine::new(mode, reference_year);

    if mode == PredictorMode::Auto {
        match engine.load_from(model) {
            Ok(()) => {}
            Err(
                err @ (PricingError::ModelUnavailable { .. } | PricingError::SchemaMismatch(_)),
            ) => {
                engine.record_fallback(&err.to_string());
                print_warning(&format!("{}; using heuristic predictor", err));
            }
            Err(err) => return Err(err).context("Failed to load model"),
        }
    }

    let predictor = engine.select()?;
    let result = engine
        .predict_with(&predictor, attrs)
        .context("Prediction failed")?;

    match format {
        OutputFormat::Json => print_json(&PredictionOutput {
            predictor: predictor.name(),
            model_version: predictor.model_version(),
            result: &result,
        })?,
        OutputFormat::Table => {
            print_info(&format!(
                "{} {} km, {}, {}, {}, {} equipment items",
                attrs.year,
                attrs.km,
                attrs.gear,
                attrs.driveline,
                attrs.fuel_type,
                attrs.equipment_len
            ));
            let rows = [
                QuantileRow {
                    quantile: "p10",
                    price: format_price(result.p10),
                },
                QuantileRow {
                    quantile: "p50",
                    price: format_price(result.p50).bold().to_string(),
                },
                QuantileRow {
                    quantile: "p90",
                    price: format_price(result.p90),
                },
            ];
            print_table(&rows);
            println!("Sold within 14 days:    {}", color_probability(result.prob14));
            println!("Sold within 30 days:    {}", color_probability(result.prob30));
            println!("Predictor:              {}", predictor.name().cyan());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_only_set_given_fields() {
        let fields = ListingFields {
            year: Some(2022),
            gear: Some("Automatic".to_string()),
            ..ListingFields::default()
        };
        let attrs = load_listing(None, fields).unwrap();
        assert_eq!(attrs.year, 2022);
        assert_eq!(attrs.gear, "Automatic");
        assert_eq!(attrs.km, 100_000.0);
        assert_eq!(attrs.fuel_type, "Petrol");
    }

    #[test]
    fn test_no_flags_is_default_listing() {
        let attrs = load_listing(None, ListingFields::default()).unwrap();
        assert_eq!(attrs, ListingAttributes::default());
    }
}
