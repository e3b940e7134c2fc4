//! pcg-governance
//!
//! Market-condition driven risk limits:
//! - regime classification from configurable threshold tables (`regime`)
//! - baseline rule sets, floors and ceilings (`limits`)
//! - dynamic limits, scenario stress and profile adjustment (`engine`)
//! - regime-change and limit-reduction alerts (`monitor`)
//!
//! The engine keeps no mutable state. Condition history is passed in by the
//! caller, and every limit is recomputed from the inputs of the call.

mod conditions;
mod engine;
mod limits;
mod monitor;
pub mod regime;

pub use conditions::{average_off_diagonal, ConditionSnapshot, MarketConditions};
pub use engine::{
    GovernanceConfig, GovernanceEngine, GovernanceScenario, LimitStressResult, ProfileAdjustment,
    CANONICAL_SCENARIOS,
};
pub use limits::{
    recommendation, Bound, DynamicLimits, LimitBounds, RiskProfile, RiskRules, StressLevel,
    StressMultipliers, ABSOLUTE_MIN_POSITION_WEIGHT, ABSOLUTE_MIN_SECTOR_WEIGHT,
};
pub use monitor::{AlertKind, AlertSeverity, GovernanceAlert, MonitorReport};
pub use regime::{
    CorrelationRegime, Regime, RegimeBand, RegimeClassifier, RegimeTable, VolatilityRegime,
};

use pcg_schemas::ErrorClass;

#[derive(Clone, Debug, PartialEq)]
pub enum GovernanceError {
    InvalidConfig(String),
    /// A regime table failed validation.
    InvalidTable { table: &'static str, reason: String },
    InvalidInput(String),
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidConfig(_) | Self::InvalidTable { .. } => ErrorClass::Configuration,
            Self::InvalidInput(_) => ErrorClass::InvalidInput,
        }
    }
}

impl std::fmt::Display for GovernanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid governance config: {msg}"),
            Self::InvalidTable { table, reason } => {
                write!(f, "invalid regime table '{table}': {reason}")
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for GovernanceError {}
