//! Parametric (variance-covariance) VaR and CVaR.
//!
//! σp = √(wᵀΣw) on daily returns, scaled by √horizon_days.
//!   VaR  = z(c) · σp · capital
//!   CVaR = φ(z(c)) / (1 − c) · σp · capital
//!
//! Both entry points return a `TailRiskEstimate` and never an error: invalid
//! input or thin data produces `Unavailable` carrying the reason and its class.

use nalgebra::DVector;
use pcg_schemas::{ErrorClass, Holding};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::debug;

use crate::correlation::{calculate_correlation_matrix, CorrelationAnalysis};
use crate::{validate_capital, validate_confidence, validate_holdings, RiskConfig, RiskError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TailRiskEstimate {
    Computed {
        /// Loss in capital units.
        value: f64,
        pct_of_capital: f64,
        confidence: f64,
        horizon_days: u32,
        /// Horizon-scaled portfolio return standard deviation.
        portfolio_sigma: f64,
    },
    Unavailable { error: String, class: ErrorClass },
}

impl TailRiskEstimate {
    pub fn unavailable(err: &RiskError) -> Self {
        Self::Unavailable {
            error: err.to_string(),
            class: err.class(),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed { value, .. } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tail {
    Quantile,
    Shortfall,
}

pub fn calculate_portfolio_var(
    holdings: &[Holding],
    capital: f64,
    confidence: f64,
    config: &RiskConfig,
) -> TailRiskEstimate {
    estimate(holdings, capital, confidence, config, Tail::Quantile)
}

pub fn calculate_portfolio_cvar(
    holdings: &[Holding],
    capital: f64,
    confidence: f64,
    config: &RiskConfig,
) -> TailRiskEstimate {
    estimate(holdings, capital, confidence, config, Tail::Shortfall)
}

fn estimate(
    holdings: &[Holding],
    capital: f64,
    confidence: f64,
    config: &RiskConfig,
    tail: Tail,
) -> TailRiskEstimate {
    try_estimate(holdings, capital, confidence, config, tail).unwrap_or_else(|e| {
        debug!(error = %e, "tail risk unavailable");
        TailRiskEstimate::unavailable(&e)
    })
}

fn try_estimate(
    holdings: &[Holding],
    capital: f64,
    confidence: f64,
    config: &RiskConfig,
    tail: Tail,
) -> Result<TailRiskEstimate, RiskError> {
    validate_tail_inputs(holdings, capital, confidence)?;
    let assets: Vec<_> = holdings.iter().map(|h| h.asset.clone()).collect();
    let analysis = calculate_correlation_matrix(&assets, config)?;
    let weights: Vec<f64> = holdings.iter().map(|h| h.weight).collect();
    tail_from_analysis(&weights, &analysis, capital, confidence, config.horizon_days, tail)
}

pub(crate) fn validate_tail_inputs(
    holdings: &[Holding],
    capital: f64,
    confidence: f64,
) -> Result<(), RiskError> {
    if holdings.len() < 2 {
        return Err(RiskError::TooFewAssets {
            got: holdings.len(),
            required: 2,
        });
    }
    validate_capital(capital)?;
    validate_confidence(confidence)?;
    validate_holdings(holdings)
}

/// VaR from an existing analysis; weights follow `analysis.tickers` order.
pub(crate) fn var_from_analysis(
    weights: &[f64],
    analysis: &CorrelationAnalysis,
    capital: f64,
    confidence: f64,
    horizon_days: u32,
) -> TailRiskEstimate {
    tail_from_analysis(weights, analysis, capital, confidence, horizon_days, Tail::Quantile)
        .unwrap_or_else(|e| TailRiskEstimate::unavailable(&e))
}

pub(crate) fn cvar_from_analysis(
    weights: &[f64],
    analysis: &CorrelationAnalysis,
    capital: f64,
    confidence: f64,
    horizon_days: u32,
) -> TailRiskEstimate {
    tail_from_analysis(weights, analysis, capital, confidence, horizon_days, Tail::Shortfall)
        .unwrap_or_else(|e| TailRiskEstimate::unavailable(&e))
}

fn tail_from_analysis(
    weights: &[f64],
    analysis: &CorrelationAnalysis,
    capital: f64,
    confidence: f64,
    horizon_days: u32,
    tail: Tail,
) -> Result<TailRiskEstimate, RiskError> {
    validate_capital(capital)?;
    validate_confidence(confidence)?;

    let w = DVector::from_column_slice(weights);
    let variance = w.dot(&(&analysis.covariance * &w)).max(0.0);
    let sigma = variance.sqrt() * f64::from(horizon_days).sqrt();

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| RiskError::InvalidConfig(format!("standard normal: {e}")))?;
    let z = normal.inverse_cdf(confidence);
    let factor = match tail {
        Tail::Quantile => z,
        Tail::Shortfall => normal.pdf(z) / (1.0 - confidence),
    };
    let value = factor * sigma * capital;

    Ok(TailRiskEstimate::Computed {
        value,
        pct_of_capital: value / capital * 100.0,
        confidence,
        horizon_days,
        portfolio_sigma: sigma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pcg_schemas::{Asset, PricePoint};

    fn holding(ticker: &str, phase: f64, amp: f64, weight: f64) -> Holding {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut px = 100.0;
        let prices = (0..80)
            .map(|t| {
                px *= 1.0 + amp * ((t as f64) * 0.9 + phase).sin();
                PricePoint::dated(base + Duration::days(t), px)
            })
            .collect();
        Holding::new(Asset::new(ticker, ticker, 60.0).with_prices(prices), weight)
    }

    fn book() -> Vec<Holding> {
        vec![
            holding("AAA", 0.0, 0.012, 0.5),
            holding("BBB", 1.3, 0.02, 0.3),
            holding("CCC", 2.1, 0.008, 0.2),
        ]
    }

    #[test]
    fn cvar_is_at_least_var() {
        let cfg = RiskConfig::default();
        for c in [0.9, 0.95, 0.99] {
            let var = calculate_portfolio_var(&book(), 1_000_000.0, c, &cfg).value().unwrap();
            let cvar = calculate_portfolio_cvar(&book(), 1_000_000.0, c, &cfg).value().unwrap();
            assert!(var > 0.0);
            assert!(cvar >= var, "c={c}: cvar {cvar} < var {var}");
        }
    }

    #[test]
    fn var_grows_with_confidence_and_horizon() {
        let cfg = RiskConfig::default();
        let v95 = calculate_portfolio_var(&book(), 1e6, 0.95, &cfg).value().unwrap();
        let v99 = calculate_portfolio_var(&book(), 1e6, 0.99, &cfg).value().unwrap();
        assert!(v99 > v95);

        let ten_day = RiskConfig {
            horizon_days: 10,
            ..RiskConfig::default()
        };
        let v95_10 = calculate_portfolio_var(&book(), 1e6, 0.95, &ten_day).value().unwrap();
        assert!((v95_10 / v95 - 10f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn var_scales_linearly_with_capital() {
        let cfg = RiskConfig::default();
        let a = calculate_portfolio_var(&book(), 1e6, 0.95, &cfg).value().unwrap();
        let b = calculate_portfolio_var(&book(), 2e6, 0.95, &cfg).value().unwrap();
        assert!((b / a - 2.0).abs() < 1e-9);
    }

    #[test]
    fn single_holding_is_unavailable_not_panic() {
        let est = calculate_portfolio_var(&book()[..1], 1e6, 0.95, &RiskConfig::default());
        match est {
            TailRiskEstimate::Unavailable { class, .. } => {
                assert_eq!(class, ErrorClass::Configuration)
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn bad_inputs_are_unavailable() {
        let cfg = RiskConfig::default();
        for (capital, c) in [(0.0, 0.95), (f64::NAN, 0.95), (1e6, 1.0), (1e6, 0.4)] {
            let est = calculate_portfolio_cvar(&book(), capital, c, &cfg);
            assert!(!est.is_available(), "capital={capital} c={c}");
            assert!(matches!(
                est,
                TailRiskEstimate::Unavailable {
                    class: ErrorClass::InvalidInput,
                    ..
                }
            ));
        }
    }

    #[test]
    fn unavailable_serializes_with_status_tag() {
        let est = TailRiskEstimate::unavailable(&RiskError::InsufficientData {
            observations: 5,
            required: 30,
        });
        let v = serde_json::to_value(&est).unwrap();
        assert_eq!(v["status"], "unavailable");
        assert_eq!(v["class"], "INSUFFICIENT_DATA");
    }
}
