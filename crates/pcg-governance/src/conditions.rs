use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::StressLevel;
use crate::regime::{CorrelationRegime, Regime, VolatilityRegime};

/// Observed market state fed to the governance engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    /// Annualised market volatility, percent.
    pub volatility: f64,
    /// Average off-diagonal pairwise correlation.
    pub average_correlation: f64,
    #[serde(default)]
    pub stress_level: StressLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MarketConditions {
    pub fn new(volatility: f64, average_correlation: f64, stress_level: StressLevel) -> Self {
        Self {
            volatility,
            average_correlation,
            stress_level,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Conditions whose correlation is the off-diagonal mean of `rows`.
    pub fn from_correlation_rows(
        volatility: f64,
        rows: &[Vec<f64>],
        stress_level: StressLevel,
    ) -> Self {
        Self::new(volatility, average_off_diagonal(rows), stress_level)
    }
}

/// Mean of the strict upper triangle of a square matrix given as rows.
///
/// NaN when there is no off-diagonal entry (fewer than two rows); NaN
/// classifies as the most severe correlation regime.
pub fn average_off_diagonal(rows: &[Vec<f64>]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, row) in rows.iter().enumerate() {
        for v in row.iter().skip(i + 1) {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// One entry of the caller-owned condition history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    pub conditions: MarketConditions,
    pub volatility_regime: Regime<VolatilityRegime>,
    pub correlation_regime: Regime<CorrelationRegime>,
    pub combined_multiplier: f64,
}
