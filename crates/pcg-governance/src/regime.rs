//! Regime classification via ordered threshold tables.
//!
//! A table is a list of bands sorted by `upper_bound` (exclusive). The last
//! band has no upper bound and catches everything above. Multipliers must be
//! non-increasing down the table: a more severe regime never loosens limits.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::GovernanceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
    Extreme,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationRegime {
    Low,
    Moderate,
    High,
    Extreme,
}

impl std::fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Extreme => "extreme",
        })
    }
}

impl std::fmt::Display for CorrelationRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Extreme => "extreme",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeBand<L> {
    pub label: L,
    /// Exclusive; `None` only on the last band.
    #[serde(default)]
    pub upper_bound: Option<f64>,
    pub multiplier: f64,
}

/// Classification result: exactly one label and its limit multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regime<L> {
    pub label: L,
    pub multiplier: f64,
}

/// Band table as configured. `compile` turns it into a `RegimeClassifier`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeTable<L> {
    pub bands: Vec<RegimeBand<L>>,
}

impl<L: Copy + std::fmt::Display> RegimeTable<L> {
    pub fn validate(&self, table: &'static str) -> Result<(), GovernanceError> {
        let bad = |reason: String| Err(GovernanceError::InvalidTable { table, reason });

        let Some(last) = self.bands.last() else {
            return bad("table has no bands".into());
        };
        if last.upper_bound.is_some() {
            return bad("last band must have no upper_bound".into());
        }
        let mut prev_bound = f64::NEG_INFINITY;
        let mut prev_mult = f64::INFINITY;
        for (i, band) in self.bands.iter().enumerate() {
            if !band.multiplier.is_finite() || band.multiplier <= 0.0 {
                return bad(format!(
                    "band '{}' multiplier must be finite and > 0 (got {})",
                    band.label, band.multiplier
                ));
            }
            if band.multiplier > prev_mult {
                return bad(format!(
                    "band '{}' multiplier {} exceeds the preceding band's {prev_mult}",
                    band.label, band.multiplier
                ));
            }
            prev_mult = band.multiplier;

            if i + 1 < self.bands.len() {
                match band.upper_bound {
                    Some(u) if u.is_finite() && u > prev_bound => prev_bound = u,
                    Some(u) => {
                        return bad(format!(
                            "band '{}' upper_bound {u} must be finite and above {prev_bound}",
                            band.label
                        ))
                    }
                    None => {
                        return bad(format!(
                            "band '{}' is not last but has no upper_bound",
                            band.label
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn compile(&self, table: &'static str) -> Result<RegimeClassifier<L>, GovernanceError> {
        self.validate(table)?;
        let most_severe = *self
            .bands
            .last()
            .ok_or_else(|| GovernanceError::InvalidTable {
                table,
                reason: "table has no bands".into(),
            })?;
        Ok(RegimeClassifier {
            bands: self.bands.clone(),
            most_severe,
        })
    }
}

/// A validated band table; classification cannot fail.
#[derive(Clone, Debug, PartialEq)]
pub struct RegimeClassifier<L> {
    bands: Vec<RegimeBand<L>>,
    most_severe: RegimeBand<L>,
}

impl<L: Copy + std::fmt::Display> RegimeClassifier<L> {
    /// First band whose upper bound exceeds `value`. NaN has no ordering and
    /// is treated as the most severe band.
    pub fn classify(&self, value: f64) -> Regime<L> {
        let band = if value.is_nan() {
            warn!(label = %self.most_severe.label, "NaN input; classified as most severe regime");
            &self.most_severe
        } else {
            self.bands
                .iter()
                .find(|b| b.upper_bound.map_or(true, |u| value < u))
                .unwrap_or(&self.most_severe)
        };
        Regime {
            label: band.label,
            multiplier: band.multiplier,
        }
    }

    pub fn bands(&self) -> &[RegimeBand<L>] {
        &self.bands
    }
}

impl Default for RegimeTable<VolatilityRegime> {
    /// Annualised volatility in percent.
    fn default() -> Self {
        Self {
            bands: vec![
                band(VolatilityRegime::Low, Some(15.0), 1.2),
                band(VolatilityRegime::Normal, Some(25.0), 1.0),
                band(VolatilityRegime::High, Some(35.0), 0.8),
                band(VolatilityRegime::Extreme, None, 0.6),
            ],
        }
    }
}

impl Default for RegimeTable<CorrelationRegime> {
    /// Average pairwise correlation.
    fn default() -> Self {
        Self {
            bands: vec![
                band(CorrelationRegime::Low, Some(0.3), 1.1),
                band(CorrelationRegime::Moderate, Some(0.5), 1.0),
                band(CorrelationRegime::High, Some(0.7), 0.85),
                band(CorrelationRegime::Extreme, None, 0.7),
            ],
        }
    }
}

impl Default for RegimeClassifier<VolatilityRegime> {
    fn default() -> Self {
        Self {
            bands: RegimeTable::default().bands,
            most_severe: band(VolatilityRegime::Extreme, None, 0.6),
        }
    }
}

impl Default for RegimeClassifier<CorrelationRegime> {
    fn default() -> Self {
        Self {
            bands: RegimeTable::default().bands,
            most_severe: band(CorrelationRegime::Extreme, None, 0.7),
        }
    }
}

fn band<L>(label: L, upper_bound: Option<f64>, multiplier: f64) -> RegimeBand<L> {
    RegimeBand {
        label,
        upper_bound,
        multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vol() -> RegimeClassifier<VolatilityRegime> {
        RegimeTable::default().compile("volatility_bands").unwrap()
    }

    #[test]
    fn defaults_validate() {
        assert!(RegimeTable::<VolatilityRegime>::default()
            .validate("volatility_bands")
            .is_ok());
        assert!(RegimeTable::<CorrelationRegime>::default()
            .validate("correlation_bands")
            .is_ok());
    }

    #[test]
    fn default_classifiers_match_compiled_tables() {
        assert_eq!(vol(), RegimeClassifier::<VolatilityRegime>::default());
        let corr = RegimeTable::<CorrelationRegime>::default()
            .compile("correlation_bands")
            .unwrap();
        assert_eq!(corr, RegimeClassifier::<CorrelationRegime>::default());
    }

    #[test]
    fn upper_bounds_are_exclusive() {
        let t = vol();
        assert_eq!(t.classify(14.999).label, VolatilityRegime::Low);
        assert_eq!(t.classify(15.0).label, VolatilityRegime::Normal);
        assert_eq!(t.classify(35.0).label, VolatilityRegime::Extreme);
        assert_eq!(t.classify(f64::INFINITY).label, VolatilityRegime::Extreme);
        assert_eq!(t.classify(-3.0).label, VolatilityRegime::Low);
    }

    #[test]
    fn nan_is_most_severe() {
        let r = vol().classify(f64::NAN);
        assert_eq!(r.label, VolatilityRegime::Extreme);
        assert_eq!(r.multiplier, 0.6);
    }

    #[test]
    fn classification_is_monotone() {
        let t = vol();
        let mut prev = f64::INFINITY;
        for i in 0..=600 {
            let m = t.classify(i as f64 * 0.1).multiplier;
            assert!(m <= prev);
            prev = m;
        }
    }

    #[test]
    fn rejects_unsorted_bounds() {
        let t = RegimeTable {
            bands: vec![
                band(VolatilityRegime::Low, Some(20.0), 1.2),
                band(VolatilityRegime::Normal, Some(10.0), 1.0),
                band(VolatilityRegime::Extreme, None, 0.6),
            ],
        };
        assert!(matches!(
            t.validate("volatility_bands"),
            Err(GovernanceError::InvalidTable { .. })
        ));
    }

    #[test]
    fn rejects_increasing_multiplier() {
        let t = RegimeTable {
            bands: vec![
                band(VolatilityRegime::Low, Some(15.0), 1.0),
                band(VolatilityRegime::Extreme, None, 1.1),
            ],
        };
        assert!(t.validate("volatility_bands").is_err());
    }

    #[test]
    fn rejects_bounded_last_band_and_empty_table() {
        let t = RegimeTable {
            bands: vec![band(VolatilityRegime::Low, Some(15.0), 1.0)],
        };
        assert!(t.validate("volatility_bands").is_err());
        let empty: RegimeTable<VolatilityRegime> = RegimeTable { bands: vec![] };
        assert!(empty.compile("volatility_bands").is_err());
    }

    #[test]
    fn table_deserializes_from_config_shape() {
        let json = r#"{"bands":[
            {"label":"low","upper_bound":0.25,"multiplier":1.1},
            {"label":"extreme","multiplier":0.7}
        ]}"#;
        let t: RegimeTable<CorrelationRegime> = serde_json::from_str(json).unwrap();
        let c = t.compile("correlation_bands").unwrap();
        assert_eq!(c.classify(0.9).label, CorrelationRegime::Extreme);
        assert_eq!(c.classify(0.1).label, CorrelationRegime::Low);
    }
}
