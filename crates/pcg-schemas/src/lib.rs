//! pcg-schemas
//!
//! Shared value types for the allocation, risk and governance engines.
//!
//! Everything here is an immutable, in-process value contract: assets arrive
//! from an upstream scanner, results leave towards report/export layers.
//! No IO, no clock.

mod asset;
mod degradation;

pub use asset::{Asset, AssetError, Holding, PricePoint};
pub use degradation::Degradation;

use serde::{Deserialize, Serialize};

/// Broad failure classes shared by every engine error type.
///
/// Callers use this to decide how to surface a failure: configuration and
/// data problems block the operation, invalid input is rejected at the
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// A caller invariant was violated (too few assets, bad config, unknown method).
    Configuration,
    /// Not enough aligned observations to estimate anything meaningful.
    InsufficientData,
    /// An input value failed validation (NaN, negative, out of range).
    InvalidInput,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "CONFIGURATION",
            ErrorClass::InsufficientData => "INSUFFICIENT_DATA",
            ErrorClass::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Herfindahl concentration index Σ wᵢ².
pub fn herfindahl(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn herfindahl_of_equal_weights_is_one_over_n() {
        let w = [0.25, 0.25, 0.25, 0.25];
        assert!((herfindahl(&w) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn error_class_serializes_screaming_case() {
        let s = serde_json::to_string(&ErrorClass::InsufficientData).unwrap();
        assert_eq!(s, "\"INSUFFICIENT_DATA\"");
        assert_eq!(ErrorClass::Configuration.to_string(), "CONFIGURATION");
    }
}
