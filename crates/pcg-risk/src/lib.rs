//! pcg-risk
//!
//! Risk estimation over a set of weighted holdings:
//! - correlation / covariance estimation with shrinkage (`correlation`)
//! - parametric VaR and CVaR (`var`)
//! - fixed market-drop stress scenarios (`stress`)
//! - composite risk report that never fails (`report`)
//!
//! Everything is a pure function of its inputs. Failures in batch-style calls
//! come back as structured values rather than errors so one bad portfolio never
//! aborts a run.

pub mod correlation;
pub mod report;
pub mod stress;
pub mod var;

pub use correlation::{
    align_closes, calculate_correlation_matrix, symmetrise, validate_estimate, AlignedCloses,
    Alignment, CorrelationAnalysis, CorrelationStats,
};
pub use report::{
    diversification_score, generate_risk_report, ConcentrationLevel, CorrelationSummary,
    RiskReport, RiskiestAsset,
};
pub use stress::{
    run_stress_test, PositionLoss, StressScenario, StressTestReport, StressTestResult,
    STRESS_SCENARIOS,
};
pub use var::{calculate_portfolio_cvar, calculate_portfolio_var, TailRiskEstimate};

use pcg_schemas::{AssetError, ErrorClass, Holding};
use serde::{Deserialize, Serialize};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Risk engine parameters (`/risk` config section).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    /// Minimum aligned price observations for correlation estimates.
    pub min_observations: usize,
    /// Confidence level used by the risk report.
    pub confidence_level: f64,
    pub horizon_days: u32,
    /// Max |C − Cᵀ| tolerated before symmetrising.
    pub symmetry_tolerance: f64,
    /// Volatility (annualised %) treated as market beta 1 in stress tests.
    pub stress_reference_volatility: f64,
    /// Volatility (annualised %) assumed when a holding has none.
    pub default_volatility: f64,
    /// Positions listed per stress scenario.
    pub worst_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_observations: 30,
            confidence_level: 0.95,
            horizon_days: 1,
            symmetry_tolerance: 1e-8,
            stress_reference_volatility: 15.0,
            default_volatility: 20.0,
            worst_positions: 3,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        let bad = |msg: String| Err(RiskError::InvalidConfig(msg));
        if self.min_observations < 3 {
            return bad(format!(
                "min_observations must be >= 3 (got {})",
                self.min_observations
            ));
        }
        validate_confidence(self.confidence_level)?;
        if self.horizon_days == 0 {
            return bad("horizon_days must be >= 1".into());
        }
        for (name, v) in [
            ("symmetry_tolerance", self.symmetry_tolerance),
            ("stress_reference_volatility", self.stress_reference_volatility),
            ("default_volatility", self.default_volatility),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return bad(format!("{name} must be finite and > 0 (got {v})"));
            }
        }
        Ok(())
    }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum RiskError {
    /// Multi-asset estimate requested with fewer than the required assets.
    TooFewAssets { got: usize, required: usize },
    /// Fewer aligned observations than `min_observations`.
    InsufficientData {
        observations: usize,
        required: usize,
    },
    InvalidConfig(String),
    /// Confidence outside the open interval (0.5, 1).
    InvalidConfidence(f64),
    InvalidCapital(f64),
    InvalidWeight { ticker: String, weight: f64 },
    InvalidAsset(AssetError),
}

impl RiskError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TooFewAssets { .. } | Self::InvalidConfig(_) => ErrorClass::Configuration,
            Self::InsufficientData { .. } => ErrorClass::InsufficientData,
            Self::InvalidConfidence(_) | Self::InvalidCapital(_) | Self::InvalidWeight { .. } => {
                ErrorClass::InvalidInput
            }
            Self::InvalidAsset(e) => e.class(),
        }
    }
}

impl std::fmt::Display for RiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewAssets { got, required } => {
                write!(f, "need at least {required} assets, got {got}")
            }
            Self::InsufficientData {
                observations,
                required,
            } => write!(
                f,
                "insufficient data: {observations} aligned observations, need {required}"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid risk config: {msg}"),
            Self::InvalidConfidence(c) => {
                write!(f, "confidence {c} must lie strictly between 0.5 and 1")
            }
            Self::InvalidCapital(c) => write!(f, "capital {c} must be finite and > 0"),
            Self::InvalidWeight { ticker, weight } => {
                write!(f, "weight {weight} for '{ticker}' must be finite and >= 0")
            }
            Self::InvalidAsset(e) => write!(f, "invalid asset: {e}"),
        }
    }
}

impl std::error::Error for RiskError {}

impl From<AssetError> for RiskError {
    fn from(e: AssetError) -> Self {
        Self::InvalidAsset(e)
    }
}

// ─── Shared validation ───────────────────────────────────────────────────────

pub(crate) fn validate_confidence(confidence: f64) -> Result<(), RiskError> {
    if confidence.is_finite() && confidence > 0.5 && confidence < 1.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidConfidence(confidence))
    }
}

pub(crate) fn validate_capital(capital: f64) -> Result<(), RiskError> {
    if capital.is_finite() && capital > 0.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidCapital(capital))
    }
}

pub(crate) fn validate_holdings(holdings: &[Holding]) -> Result<(), RiskError> {
    for h in holdings {
        h.asset.validate()?;
        if !h.weight.is_finite() || h.weight < 0.0 {
            return Err(RiskError::InvalidWeight {
                ticker: h.asset.ticker.clone(),
                weight: h.weight,
            });
        }
    }
    Ok(())
}

// ─── RiskEngine ──────────────────────────────────────────────────────────────

/// Config-carrying facade over the module functions. The config is
/// validated once here.
#[derive(Clone, Debug, Default)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn calculate_correlation_matrix(
        &self,
        assets: &[pcg_schemas::Asset],
    ) -> Result<CorrelationAnalysis, RiskError> {
        calculate_correlation_matrix(assets, &self.config)
    }

    pub fn calculate_portfolio_var(
        &self,
        holdings: &[Holding],
        capital: f64,
        confidence: f64,
    ) -> TailRiskEstimate {
        calculate_portfolio_var(holdings, capital, confidence, &self.config)
    }

    pub fn calculate_portfolio_cvar(
        &self,
        holdings: &[Holding],
        capital: f64,
        confidence: f64,
    ) -> TailRiskEstimate {
        calculate_portfolio_cvar(holdings, capital, confidence, &self.config)
    }

    pub fn run_stress_test(
        &self,
        holdings: &[Holding],
        capital: f64,
    ) -> Result<StressTestReport, RiskError> {
        run_stress_test(holdings, capital, &self.config)
    }

    pub fn generate_risk_report(&self, holdings: &[Holding], capital: f64) -> RiskReport {
        generate_risk_report(holdings, capital, &self.config)
    }
}
