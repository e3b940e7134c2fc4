//! Composite risk report.
//!
//! `generate_risk_report` never fails. Each section degrades on its own:
//! a correlation failure leaves VaR/CVaR `Unavailable`, a stress failure
//! leaves `stress_tests` empty, and the reason lands in `errors`.

use pcg_schemas::{herfindahl, Degradation, Holding};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::correlation::{calculate_correlation_matrix, Alignment, CorrelationAnalysis};
use crate::stress::{run_stress_test, StressTestResult};
use crate::var::{cvar_from_analysis, validate_tail_inputs, var_from_analysis, TailRiskEstimate};
use crate::RiskConfig;

/// Herfindahl-based concentration label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentrationLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ConcentrationLevel {
    /// < 0.10 Low, < 0.18 Moderate, < 0.25 High, otherwise VeryHigh.
    pub fn from_herfindahl(hhi: f64) -> Self {
        if hhi < 0.10 {
            Self::Low
        } else if hhi < 0.18 {
            Self::Moderate
        } else if hhi < 0.25 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub observations: usize,
    pub shrinkage_intensity: f64,
    pub alignment: Alignment,
}

impl From<&CorrelationAnalysis> for CorrelationSummary {
    fn from(a: &CorrelationAnalysis) -> Self {
        Self {
            average: a.stats.average,
            max: a.stats.max,
            min: a.stats.min,
            observations: a.observations,
            shrinkage_intensity: a.shrinkage_intensity,
            alignment: a.alignment,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskiestAsset {
    pub ticker: String,
    pub volatility: f64,
    pub weight: f64,
    /// volatility × weight.
    pub risk_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub capital: f64,
    pub confidence: f64,
    pub portfolio_var: TailRiskEstimate,
    pub portfolio_cvar: TailRiskEstimate,
    pub correlation: Option<CorrelationSummary>,
    pub stress_tests: Vec<StressTestResult>,
    pub riskiest_asset: Option<RiskiestAsset>,
    /// Herfindahl Σwᵢ².
    pub concentration: f64,
    pub concentration_level: ConcentrationLevel,
    pub effective_n: f64,
    /// 0–100, higher is better diversified.
    pub diversification_score: f64,
    pub warnings: Vec<Degradation>,
    /// Why a section fell back; empty when everything was computed.
    pub errors: Vec<String>,
}

/// (1 − max(ρ̄, 0)) × min(effN / 10, 1) × 100; the correlation term is dropped
/// when no correlation estimate exists.
pub fn diversification_score(average_correlation: Option<f64>, effective_n: f64) -> f64 {
    let breadth = (effective_n / 10.0).clamp(0.0, 1.0);
    let corr_term = average_correlation.map_or(1.0, |c| 1.0 - c.max(0.0));
    (corr_term * breadth * 100.0).clamp(0.0, 100.0)
}

pub fn generate_risk_report(holdings: &[Holding], capital: f64, config: &RiskConfig) -> RiskReport {
    let confidence = config.confidence_level;
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let analysis = validate_tail_inputs(holdings, capital, confidence).and_then(|_| {
        let assets: Vec<_> = holdings.iter().map(|h| h.asset.clone()).collect();
        calculate_correlation_matrix(&assets, config)
    });

    let (portfolio_var, portfolio_cvar, correlation) = match &analysis {
        Ok(a) => {
            warnings.extend(a.warnings.iter().cloned());
            let weights: Vec<f64> = holdings.iter().map(|h| h.weight).collect();
            (
                var_from_analysis(&weights, a, capital, confidence, config.horizon_days),
                cvar_from_analysis(&weights, a, capital, confidence, config.horizon_days),
                Some(CorrelationSummary::from(a)),
            )
        }
        Err(e) => {
            warn!(error = %e, "risk report: tail risk unavailable");
            errors.push(format!("tail risk: {e}"));
            let fallback = TailRiskEstimate::unavailable(e);
            (fallback.clone(), fallback, None)
        }
    };

    let stress_tests = match run_stress_test(holdings, capital, config) {
        Ok(rep) => {
            for w in rep.warnings {
                if !warnings.contains(&w) {
                    warnings.push(w);
                }
            }
            rep.results
        }
        Err(e) => {
            warn!(error = %e, "risk report: stress tests skipped");
            errors.push(format!("stress test: {e}"));
            Vec::new()
        }
    };

    let weights: Vec<f64> = holdings.iter().map(|h| h.weight).collect();
    let concentration = herfindahl(&weights);
    let effective_n = if concentration > 0.0 && concentration.is_finite() {
        1.0 / concentration
    } else {
        0.0
    };

    let riskiest_asset = riskiest(holdings, config);
    let diversification_score =
        diversification_score(correlation.as_ref().map(|c| c.average), effective_n);

    info!(
        holdings = holdings.len(),
        var_available = portfolio_var.is_available(),
        stress_scenarios = stress_tests.len(),
        diversification_score,
        "risk report generated"
    );

    RiskReport {
        capital,
        confidence,
        portfolio_var,
        portfolio_cvar,
        correlation,
        stress_tests,
        riskiest_asset,
        concentration,
        concentration_level: ConcentrationLevel::from_herfindahl(concentration),
        effective_n,
        diversification_score,
        warnings,
        errors,
    }
}

fn riskiest(holdings: &[Holding], config: &RiskConfig) -> Option<RiskiestAsset> {
    holdings
        .iter()
        .filter(|h| h.weight.is_finite())
        .map(|h| {
            let volatility = h
                .asset
                .volatility
                .filter(|v| v.is_finite())
                .unwrap_or(config.default_volatility);
            RiskiestAsset {
                ticker: h.asset.ticker.clone(),
                volatility,
                weight: h.weight,
                risk_score: volatility * h.weight,
            }
        })
        .max_by(|a, b| a.risk_score.total_cmp(&b.risk_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pcg_schemas::{Asset, PricePoint};

    fn holding(ticker: &str, vol: f64, weight: f64, phase: f64, days: i64) -> Holding {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut px = 50.0;
        let prices = (0..days)
            .map(|t| {
                px *= 1.0 + 0.01 * ((t as f64) * 0.8 + phase).sin();
                PricePoint::dated(base + Duration::days(t), px)
            })
            .collect();
        Holding::new(
            Asset::new(ticker, ticker, 60.0)
                .with_volatility(vol)
                .with_prices(prices),
            weight,
        )
    }

    #[test]
    fn full_report_when_data_is_sufficient() {
        let book = vec![
            holding("AAA", 18.0, 0.4, 0.0, 60),
            holding("BBB", 32.0, 0.35, 1.0, 60),
            holding("CCC", 12.0, 0.25, 2.0, 60),
        ];
        let rep = generate_risk_report(&book, 250_000.0, &RiskConfig::default());
        assert!(rep.portfolio_var.is_available());
        assert!(rep.portfolio_cvar.value().unwrap() >= rep.portfolio_var.value().unwrap());
        assert_eq!(rep.stress_tests.len(), 4);
        assert_eq!(rep.riskiest_asset.as_ref().unwrap().ticker, "BBB");
        assert!(rep.correlation.is_some());
        assert!(rep.errors.is_empty());
        assert_eq!(rep.concentration_level, ConcentrationLevel::VeryHigh);
        assert!((0.0..=100.0).contains(&rep.diversification_score));
    }

    #[test]
    fn thin_data_falls_back_but_keeps_stress_tests() {
        let book = vec![
            holding("AAA", 18.0, 0.5, 0.0, 10),
            holding("BBB", 32.0, 0.5, 1.0, 10),
        ];
        let rep = generate_risk_report(&book, 100_000.0, &RiskConfig::default());
        assert!(matches!(
            rep.portfolio_var,
            TailRiskEstimate::Unavailable {
                class: pcg_schemas::ErrorClass::InsufficientData,
                ..
            }
        ));
        assert_eq!(rep.stress_tests.len(), 4);
        assert!(rep.correlation.is_none());
        assert_eq!(rep.errors.len(), 1);
    }

    #[test]
    fn invalid_capital_yields_safe_fallback() {
        let book = vec![holding("AAA", 18.0, 1.0, 0.0, 60)];
        let rep = generate_risk_report(&book, f64::NAN, &RiskConfig::default());
        assert!(!rep.portfolio_var.is_available());
        assert!(rep.stress_tests.is_empty());
        assert_eq!(rep.errors.len(), 2);
    }

    #[test]
    fn empty_book_never_panics() {
        let rep = generate_risk_report(&[], 100_000.0, &RiskConfig::default());
        assert!(!rep.portfolio_var.is_available());
        assert!(rep.stress_tests.is_empty());
        assert!(rep.riskiest_asset.is_none());
        assert_eq!(rep.effective_n, 0.0);
    }

    #[test]
    fn concentration_bands() {
        assert_eq!(ConcentrationLevel::from_herfindahl(0.05), ConcentrationLevel::Low);
        assert_eq!(ConcentrationLevel::from_herfindahl(0.10), ConcentrationLevel::Moderate);
        assert_eq!(ConcentrationLevel::from_herfindahl(0.20), ConcentrationLevel::High);
        assert_eq!(ConcentrationLevel::from_herfindahl(0.25), ConcentrationLevel::VeryHigh);
    }

    #[test]
    fn diversification_score_components() {
        assert!((diversification_score(Some(0.0), 10.0) - 100.0).abs() < 1e-12);
        assert!((diversification_score(Some(0.5), 10.0) - 50.0).abs() < 1e-12);
        assert!((diversification_score(Some(-0.4), 5.0) - 50.0).abs() < 1e-12);
        assert!((diversification_score(None, 20.0) - 100.0).abs() < 1e-12);
    }
}
