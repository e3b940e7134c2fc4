//! Dynamic governance engine.
//!
//! Stateless: every call recomputes from the explicit conditions passed in.
//! The engine only holds validated configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conditions::MarketConditions;
use crate::limits::{
    recommendation, DynamicLimits, LimitBounds, RiskProfile, RiskRules, StressLevel,
    StressMultipliers,
};
use crate::regime::{
    CorrelationRegime, Regime, RegimeClassifier, RegimeTable, VolatilityRegime,
};
use crate::GovernanceError;

// ─── Config ──────────────────────────────────────────────────────────────────

/// Governance parameters (`/governance` config section).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovernanceConfig {
    pub volatility_bands: RegimeTable<VolatilityRegime>,
    pub correlation_bands: RegimeTable<CorrelationRegime>,
    pub stress_multipliers: StressMultipliers,
    /// Fixed baseline; dynamic limits are derived from it on every call.
    pub base_rules: RiskRules,
    pub limit_bounds: LimitBounds,
    /// Named baselines for `adjust_risk_profile`; keys are matched case-insensitively.
    pub profiles: BTreeMap<String, RiskRules>,
    /// LIMIT_REDUCTION fires when dynamic / base max_position_weight drops below this.
    pub limit_reduction_alert_ratio: f64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        let profiles = [
            ("conservative", RiskRules::conservative()),
            ("moderate", RiskRules::moderate()),
            ("aggressive", RiskRules::aggressive()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            volatility_bands: RegimeTable::default(),
            correlation_bands: RegimeTable::default(),
            stress_multipliers: StressMultipliers::default(),
            base_rules: RiskRules::default(),
            limit_bounds: LimitBounds::default(),
            profiles,
            limit_reduction_alert_ratio: 0.75,
        }
    }
}

impl GovernanceConfig {
    pub fn validate(&self) -> Result<(), GovernanceError> {
        self.volatility_bands.validate("volatility_bands")?;
        self.correlation_bands.validate("correlation_bands")?;
        self.stress_multipliers.validate()?;
        self.base_rules.validate("base_rules")?;
        self.limit_bounds.validate()?;
        for (name, rules) in &self.profiles {
            rules.validate(name)?;
        }
        let r = self.limit_reduction_alert_ratio;
        if !r.is_finite() || r <= 0.0 || r > 1.0 {
            return Err(GovernanceError::InvalidConfig(format!(
                "limit_reduction_alert_ratio must be in (0, 1] (got {r})"
            )));
        }
        Ok(())
    }
}

// ─── Scenario / profile results ──────────────────────────────────────────────

/// Canonical market scenario used by the limit stress test.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GovernanceScenario {
    pub name: &'static str,
    pub volatility: f64,
    pub correlation: f64,
    pub stress_level: StressLevel,
}

impl GovernanceScenario {
    pub fn conditions(&self) -> MarketConditions {
        MarketConditions::new(self.volatility, self.correlation, self.stress_level)
    }

    /// 0–100 from the conditions alone: volatility (40), correlation (30),
    /// stress level (30).
    pub fn severity_score(&self) -> f64 {
        let vol = (self.volatility / 50.0).clamp(0.0, 1.0) * 40.0;
        let corr = self.correlation.clamp(0.0, 1.0) * 30.0;
        let stress = f64::from(self.stress_level.rank()) / 3.0 * 30.0;
        vol + corr + stress
    }
}

pub const CANONICAL_SCENARIOS: [GovernanceScenario; 5] = [
    GovernanceScenario {
        name: "Calm Bull",
        volatility: 10.0,
        correlation: 0.2,
        stress_level: StressLevel::Normal,
    },
    GovernanceScenario {
        name: "Normal",
        volatility: 18.0,
        correlation: 0.4,
        stress_level: StressLevel::Normal,
    },
    GovernanceScenario {
        name: "Elevated Volatility",
        volatility: 28.0,
        correlation: 0.55,
        stress_level: StressLevel::Elevated,
    },
    GovernanceScenario {
        name: "Market Correction",
        volatility: 38.0,
        correlation: 0.65,
        stress_level: StressLevel::High,
    },
    GovernanceScenario {
        name: "Financial Crisis",
        volatility: 55.0,
        correlation: 0.85,
        stress_level: StressLevel::Crisis,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitStressResult {
    pub scenario: String,
    pub severity_score: f64,
    pub conditions: MarketConditions,
    pub limits: DynamicLimits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileAdjustment {
    pub requested_profile: String,
    /// False when the name was unknown and the default rule set was used.
    pub matched: bool,
    pub limits: DynamicLimits,
    /// Label implied by the adjusted max position weight.
    pub effective_profile: RiskProfile,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct GovernanceEngine {
    pub(crate) config: GovernanceConfig,
    volatility: RegimeClassifier<VolatilityRegime>,
    correlation: RegimeClassifier<CorrelationRegime>,
}

impl GovernanceEngine {
    pub fn new(config: GovernanceConfig) -> Result<Self, GovernanceError> {
        config.validate()?;
        let volatility = config.volatility_bands.compile("volatility_bands")?;
        let correlation = config.correlation_bands.compile("correlation_bands")?;
        Ok(Self {
            config,
            volatility,
            correlation,
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn detect_volatility_regime(&self, volatility: f64) -> Regime<VolatilityRegime> {
        self.volatility.classify(volatility)
    }

    pub fn detect_correlation_regime(&self, correlation: f64) -> Regime<CorrelationRegime> {
        self.correlation.classify(correlation)
    }

    /// Dynamic limits for `conditions` on top of the configured baseline.
    pub fn calculate_dynamic_limits(&self, conditions: &MarketConditions) -> DynamicLimits {
        self.limits_for(&self.config.base_rules, conditions)
    }

    /// Dynamic limits on top of an arbitrary baseline.
    pub fn limits_for(&self, base: &RiskRules, conditions: &MarketConditions) -> DynamicLimits {
        let volatility_regime = self.detect_volatility_regime(conditions.volatility);
        let correlation_regime = self.detect_correlation_regime(conditions.average_correlation);
        let stress_multiplier = self
            .config
            .stress_multipliers
            .for_level(conditions.stress_level);
        let combined_multiplier =
            volatility_regime.multiplier * correlation_regime.multiplier * stress_multiplier;

        let limits = self.config.limit_bounds.scale(base, combined_multiplier);

        debug!(
            volatility = %volatility_regime.label,
            correlation = %correlation_regime.label,
            stress = %conditions.stress_level,
            combined_multiplier,
            max_position_weight = limits.max_position_weight,
            "dynamic limits computed"
        );

        DynamicLimits {
            limits,
            base_rules: base.clone(),
            volatility_regime,
            correlation_regime,
            stress_level: conditions.stress_level,
            stress_multiplier,
            combined_multiplier,
            recommendation: recommendation(combined_multiplier).to_string(),
            as_of: conditions.timestamp,
        }
    }

    /// Limits under each canonical scenario, least to most severe.
    pub fn stress_test_dynamic_limits(&self, base_rules: Option<&RiskRules>) -> Vec<LimitStressResult> {
        let base = base_rules.unwrap_or(&self.config.base_rules);
        let results: Vec<LimitStressResult> = CANONICAL_SCENARIOS
            .iter()
            .map(|s| {
                let conditions = s.conditions();
                LimitStressResult {
                    scenario: s.name.to_string(),
                    severity_score: s.severity_score(),
                    limits: self.limits_for(base, &conditions),
                    conditions,
                }
            })
            .collect();
        info!(scenarios = results.len(), "limit stress test complete");
        results
    }

    /// Apply dynamic limits to a named profile baseline. Unknown names use
    /// `base_rules`.
    pub fn adjust_risk_profile(
        &self,
        profile_name: &str,
        conditions: &MarketConditions,
    ) -> ProfileAdjustment {
        let key = profile_name.trim().to_ascii_lowercase();
        let found = self
            .config
            .profiles
            .iter()
            .find(|(name, _)| name.to_ascii_lowercase() == key)
            .map(|(_, rules)| rules);
        if found.is_none() {
            info!(profile = profile_name, "unknown risk profile; using default rules");
        }
        let base = found.unwrap_or(&self.config.base_rules);
        let limits = self.limits_for(base, conditions);
        let effective_profile = RiskProfile::from_max_position_weight(limits.limits.max_position_weight);

        ProfileAdjustment {
            requested_profile: profile_name.to_string(),
            matched: found.is_some(),
            limits,
            effective_profile,
        }
    }
}

impl Default for GovernanceEngine {
    fn default() -> Self {
        Self {
            config: GovernanceConfig::default(),
            volatility: RegimeClassifier::default(),
            correlation: RegimeClassifier::default(),
        }
    }
}
