//! Risk rule sets, limit bounds and the dynamic-limit result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::{CorrelationRegime, Regime, VolatilityRegime};
use crate::GovernanceError;

/// `max_position_weight` floor no configuration may go below.
pub const ABSOLUTE_MIN_POSITION_WEIGHT: f64 = 0.05;
/// `max_sector_weight` floor no configuration may go below.
pub const ABSOLUTE_MIN_SECTOR_WEIGHT: f64 = 0.15;

// ─── Stress level ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    #[default]
    Normal,
    Elevated,
    High,
    Crisis,
}

impl StressLevel {
    pub const ALL: [StressLevel; 4] = [Self::Normal, Self::Elevated, Self::High, Self::Crisis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::High => "high",
            Self::Crisis => "crisis",
        }
    }

    /// 0 for Normal up to 3 for Crisis.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Elevated => 1,
            Self::High => 2,
            Self::Crisis => 3,
        }
    }
}

impl std::fmt::Display for StressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StressLevel {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == key)
            .ok_or_else(|| GovernanceError::InvalidInput(format!("unknown stress level '{s}'")))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StressMultipliers {
    pub normal: f64,
    pub elevated: f64,
    pub high: f64,
    pub crisis: f64,
}

impl Default for StressMultipliers {
    fn default() -> Self {
        Self {
            normal: 1.0,
            elevated: 0.85,
            high: 0.7,
            crisis: 0.5,
        }
    }
}

impl StressMultipliers {
    pub fn for_level(&self, level: StressLevel) -> f64 {
        match level {
            StressLevel::Normal => self.normal,
            StressLevel::Elevated => self.elevated,
            StressLevel::High => self.high,
            StressLevel::Crisis => self.crisis,
        }
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        let ordered = [self.normal, self.elevated, self.high, self.crisis];
        if ordered.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(GovernanceError::InvalidConfig(
                "stress multipliers must be finite and > 0".into(),
            ));
        }
        if ordered.windows(2).any(|w| w[1] > w[0]) {
            return Err(GovernanceError::InvalidConfig(
                "stress multipliers must be non-increasing from normal to crisis".into(),
            ));
        }
        Ok(())
    }
}

// ─── Risk rules ──────────────────────────────────────────────────────────────

/// A limit set. Weights are fractions, volatility is annualised %.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskRules {
    pub max_position_weight: f64,
    pub max_sector_weight: f64,
    pub max_portfolio_volatility: f64,
    pub max_drawdown_limit: f64,
    pub min_cash_buffer: f64,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            max_position_weight: 0.15,
            max_sector_weight: 0.35,
            max_portfolio_volatility: 20.0,
            max_drawdown_limit: 0.15,
            min_cash_buffer: 0.05,
        }
    }
}

impl RiskRules {
    pub fn conservative() -> Self {
        Self {
            max_position_weight: 0.08,
            max_sector_weight: 0.25,
            max_portfolio_volatility: 12.0,
            max_drawdown_limit: 0.10,
            min_cash_buffer: 0.10,
        }
    }

    pub fn moderate() -> Self {
        Self::default()
    }

    pub fn aggressive() -> Self {
        Self {
            max_position_weight: 0.25,
            max_sector_weight: 0.50,
            max_portfolio_volatility: 28.0,
            max_drawdown_limit: 0.25,
            min_cash_buffer: 0.02,
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), GovernanceError> {
        let caps = [
            ("max_position_weight", self.max_position_weight),
            ("max_sector_weight", self.max_sector_weight),
            ("max_portfolio_volatility", self.max_portfolio_volatility),
            ("max_drawdown_limit", self.max_drawdown_limit),
        ];
        for (field, v) in caps {
            if !v.is_finite() || v <= 0.0 {
                return Err(GovernanceError::InvalidConfig(format!(
                    "rules '{name}': {field} must be finite and > 0 (got {v})"
                )));
            }
        }
        if !self.min_cash_buffer.is_finite() || self.min_cash_buffer < 0.0 {
            return Err(GovernanceError::InvalidConfig(format!(
                "rules '{name}': min_cash_buffer must be finite and >= 0 (got {})",
                self.min_cash_buffer
            )));
        }
        Ok(())
    }
}

// ─── Bounds ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bound {
    pub floor: f64,
    pub ceiling: f64,
}

impl Bound {
    pub const fn new(floor: f64, ceiling: f64) -> Self {
        Self { floor, ceiling }
    }

    /// Clamp into `[floor, ceiling]`; non-finite input collapses to the floor.
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.floor, self.ceiling)
        } else {
            self.floor
        }
    }

    fn validate(&self, field: &str, absolute_min: f64) -> Result<(), GovernanceError> {
        if !self.floor.is_finite() || !self.ceiling.is_finite() || self.floor > self.ceiling {
            return Err(GovernanceError::InvalidConfig(format!(
                "limit_bounds.{field}: need finite floor <= ceiling (got [{}, {}])",
                self.floor, self.ceiling
            )));
        }
        if self.floor < absolute_min {
            return Err(GovernanceError::InvalidConfig(format!(
                "limit_bounds.{field}: floor {} is below the absolute minimum {absolute_min}",
                self.floor
            )));
        }
        Ok(())
    }
}

/// Floor/ceiling applied to every dynamic limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitBounds {
    pub max_position_weight: Bound,
    pub max_sector_weight: Bound,
    pub max_portfolio_volatility: Bound,
    pub max_drawdown_limit: Bound,
    pub min_cash_buffer: Bound,
}

impl Default for LimitBounds {
    fn default() -> Self {
        Self {
            max_position_weight: Bound::new(0.05, 0.40),
            max_sector_weight: Bound::new(0.15, 0.60),
            max_portfolio_volatility: Bound::new(8.0, 35.0),
            max_drawdown_limit: Bound::new(0.05, 0.30),
            min_cash_buffer: Bound::new(0.0, 0.50),
        }
    }
}

impl LimitBounds {
    pub fn validate(&self) -> Result<(), GovernanceError> {
        self.max_position_weight
            .validate("max_position_weight", ABSOLUTE_MIN_POSITION_WEIGHT)?;
        self.max_sector_weight
            .validate("max_sector_weight", ABSOLUTE_MIN_SECTOR_WEIGHT)?;
        self.max_portfolio_volatility
            .validate("max_portfolio_volatility", f64::MIN_POSITIVE)?;
        self.max_drawdown_limit
            .validate("max_drawdown_limit", f64::MIN_POSITIVE)?;
        self.min_cash_buffer.validate("min_cash_buffer", 0.0)
    }

    /// Caps scale with `multiplier`; the cash buffer scales with its inverse.
    pub fn scale(&self, base: &RiskRules, multiplier: f64) -> RiskRules {
        RiskRules {
            max_position_weight: self
                .max_position_weight
                .apply(base.max_position_weight * multiplier),
            max_sector_weight: self
                .max_sector_weight
                .apply(base.max_sector_weight * multiplier),
            max_portfolio_volatility: self
                .max_portfolio_volatility
                .apply(base.max_portfolio_volatility * multiplier),
            max_drawdown_limit: self
                .max_drawdown_limit
                .apply(base.max_drawdown_limit * multiplier),
            min_cash_buffer: self.min_cash_buffer.apply(base.min_cash_buffer / multiplier),
        }
    }
}

// ─── Dynamic limits ──────────────────────────────────────────────────────────

/// Limits recalculated for one set of market conditions. Never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicLimits {
    pub limits: RiskRules,
    pub base_rules: RiskRules,
    pub volatility_regime: Regime<VolatilityRegime>,
    pub correlation_regime: Regime<CorrelationRegime>,
    pub stress_level: StressLevel,
    pub stress_multiplier: f64,
    /// volatility × correlation × stress multiplier.
    pub combined_multiplier: f64,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl DynamicLimits {
    /// Dynamic / base `max_position_weight`.
    pub fn position_limit_ratio(&self) -> f64 {
        self.limits.max_position_weight / self.base_rules.max_position_weight
    }
}

pub fn recommendation(combined_multiplier: f64) -> &'static str {
    if combined_multiplier >= 1.1 {
        "Favourable conditions: limits expanded above baseline; keep position sizing disciplined."
    } else if combined_multiplier >= 0.95 {
        "Normal conditions: operate at baseline limits."
    } else if combined_multiplier >= 0.75 {
        "Caution: limits tightened; trim the largest positions and review sector concentration."
    } else if combined_multiplier >= 0.5 {
        "Defensive: limits materially reduced; raise cash and cut high-volatility exposure."
    } else {
        "Capital preservation: limits at or near floors; hold elevated cash until conditions normalise."
    }
}

// ─── Profile label ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// < 0.10 conservative, < 0.20 moderate, otherwise aggressive.
    pub fn from_max_position_weight(w: f64) -> Self {
        if w < 0.10 {
            Self::Conservative
        } else if w < 0.20 {
            Self::Moderate
        } else {
            Self::Aggressive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_collapses_non_finite_to_floor() {
        let b = Bound::new(0.05, 0.40);
        assert_eq!(b.apply(f64::NAN), 0.05);
        assert_eq!(b.apply(f64::INFINITY), 0.05);
        assert_eq!(b.apply(0.9), 0.40);
        assert_eq!(b.apply(0.01), 0.05);
    }

    #[test]
    fn floors_below_absolute_minimum_are_rejected() {
        let bounds = LimitBounds {
            max_position_weight: Bound::new(0.01, 0.40),
            ..LimitBounds::default()
        };
        assert!(bounds.validate().is_err());

        let bounds = LimitBounds {
            max_sector_weight: Bound::new(0.10, 0.60),
            ..LimitBounds::default()
        };
        assert!(bounds.validate().is_err());
        assert!(LimitBounds::default().validate().is_ok());
    }

    #[test]
    fn scale_moves_caps_and_cash_in_opposite_directions() {
        let base = RiskRules::default();
        let tight = LimitBounds::default().scale(&base, 0.5);
        assert!(tight.max_position_weight < base.max_position_weight);
        assert!(tight.min_cash_buffer > base.min_cash_buffer);
        assert!((tight.min_cash_buffer - 0.10).abs() < 1e-12);
    }

    #[test]
    fn stress_multipliers_must_not_increase() {
        let m = StressMultipliers {
            crisis: 0.9,
            ..StressMultipliers::default()
        };
        assert!(m.validate().is_err());
        assert!(StressMultipliers::default().validate().is_ok());
    }

    #[test]
    fn stress_level_parses() {
        assert_eq!("Crisis".parse::<StressLevel>().unwrap(), StressLevel::Crisis);
        assert!("panic".parse::<StressLevel>().is_err());
    }

    #[test]
    fn profile_labels() {
        assert_eq!(RiskProfile::from_max_position_weight(0.08), RiskProfile::Conservative);
        assert_eq!(RiskProfile::from_max_position_weight(0.10), RiskProfile::Moderate);
        assert_eq!(RiskProfile::from_max_position_weight(0.20), RiskProfile::Aggressive);
    }
}
