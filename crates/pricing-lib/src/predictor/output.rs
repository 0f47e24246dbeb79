//! Prediction output post-processing
//!
//! Turns raw quantile estimates into an ordered integer triple and rounds
//! sale probabilities, so both predictors return results with the same
//! guarantees.

use crate::error::{PricingError, Result};

/// Upper bound of the 30-day sale probability for both predictors
pub const MAX_PROB30: f64 = 0.95;

/// 2^63, the first magnitude a truncated estimate cannot be stored at
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Round a probability to two decimals
pub fn round_probability(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

/// Truncate raw quantile estimates to integers and order them
///
/// Independently fitted regressors can cross; the result is always sorted
/// so that `p10 <= p50 <= p90`. A non-finite estimate, or one that does not
/// fit in an `i64`, is an error and is never coerced.
pub fn order_quantiles(raw: [f64; 3]) -> Result<[i64; 3]> {
    for (label, value) in ["p10", "p50", "p90"].iter().zip(raw) {
        if !value.is_finite() {
            return Err(PricingError::Prediction(format!(
                "{} regressor produced non-finite value {}",
                label, value
            )));
        }
        // 2^63 itself is out of range, -2^63 is not
        if value >= I64_UPPER || value < -I64_UPPER {
            return Err(PricingError::Prediction(format!(
                "{} regressor produced {} outside the representable price range",
                label, value
            )));
        }
    }

    let mut quantiles = raw.map(|v| v.trunc() as i64);
    if quantiles.windows(2).any(|w| w[0] > w[1]) {
        tracing::debug!(
            p10 = quantiles[0],
            p50 = quantiles[1],
            p90 = quantiles[2],
            "Quantile crossing corrected"
        );
        quantiles.sort_unstable();
    }
    Ok(quantiles)
}

/// 30-day probability derived from the 14-day one, never below it
pub fn prob30_from(prob14: f64, uplift: f64) -> f64 {
    (prob14 + uplift).min(MAX_PROB30).max(prob14)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.456), 0.46);
        assert_eq!(round_probability(0.4), 0.4);
        assert_eq!(round_probability(0.951), 0.95);
    }

    #[test]
    fn test_order_quantiles_truncates() {
        let q = order_quantiles([99_999.9, 120_000.2, 140_000.99]).unwrap();
        assert_eq!(q, [99_999, 120_000, 140_000]);
    }

    #[test]
    fn test_order_quantiles_corrects_crossing() {
        let q = order_quantiles([150_000.0, 120_000.0, 100_000.0]).unwrap();
        assert_eq!(q, [100_000, 120_000, 150_000]);

        let q = order_quantiles([110_000.0, 100_000.0, 130_000.0]).unwrap();
        assert_eq!(q, [100_000, 110_000, 130_000]);
    }

    #[test]
    fn test_order_quantiles_rejects_non_finite() {
        let err = order_quantiles([1.0, f64::NAN, 3.0]).unwrap_err();
        assert!(matches!(err, PricingError::Prediction(_)));
        assert!(order_quantiles([f64::INFINITY, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_order_quantiles_rejects_out_of_range() {
        let err = order_quantiles([1.0, 1e300, 3.0]).unwrap_err();
        assert!(matches!(err, PricingError::Prediction(_)));
        assert!(order_quantiles([-1e20, 2.0, 3.0]).is_err());
        assert!(order_quantiles([1.0, 2.0, 9_223_372_036_854_775_808.0]).is_err());

        // Largest magnitudes that still truncate into an i64
        let q = order_quantiles([-9_223_372_036_854_775_808.0, 0.0, 9.2e18]).unwrap();
        assert_eq!(q[0], i64::MIN);
        assert_eq!(q[2], 9_200_000_000_000_000_000);
    }

    #[test]
    fn test_prob30_never_below_prob14() {
        assert!((prob30_from(0.5, 0.2) - 0.7).abs() < 1e-12);
        assert_eq!(prob30_from(0.85, 0.15), MAX_PROB30);
        assert_eq!(prob30_from(0.97, 0.15), 0.97);
    }
}
