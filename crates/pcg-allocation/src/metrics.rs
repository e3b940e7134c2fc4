//! Fast-path risk approximation for an allocation.
//!
//! Assumes a single average pairwise correlation ρ̄ between every pair of
//! positions. This is O(n²) and needs no price history; the fitted-matrix
//! estimate lives in `pcg-risk` and the two are never mixed.

use pcg_schemas::herfindahl;
use serde::{Deserialize, Serialize};

use crate::PortfolioAllocation;

/// ρ̄ used by the constant-correlation approximation.
pub const ASSUMED_AVERAGE_CORRELATION: f64 = 0.3;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard normal quantile at 95 %.
const Z_95: f64 = 1.644_853_626_951_472_2;

/// Expected-shortfall factor at 95 %: φ(z₉₅) / 0.05.
const ES_FACTOR_95: f64 = 2.062_712_807_507_425_6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarginalRisk {
    pub ticker: String,
    pub weight: f64,
    pub volatility: f64,
    /// ∂σp/∂wᵢ in annualised %.
    pub marginal_volatility: f64,
    /// Euler share wᵢ·(∂σp/∂wᵢ)/σp × 100; sums to 100 across positions.
    pub risk_share_pct: f64,
    /// wᵢσᵢ/σp × 100 (ignores correlation; sums to the diversification ratio × 100).
    pub standalone_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskMetrics {
    /// Annualised %.
    pub portfolio_volatility: f64,
    pub weighted_average_volatility: f64,
    pub diversification_ratio: f64,
    /// Herfindahl Σwᵢ².
    pub concentration: f64,
    pub effective_n: f64,
    /// Weighted per-asset drawdown estimate, %.
    pub estimated_max_drawdown: f64,
    /// One-day 95 % VaR in capital units.
    pub var_95: f64,
    pub cvar_95: f64,
    pub marginal_risk: Vec<MarginalRisk>,
}

/// σp = √(Σwᵢ²σᵢ² + 2ρ Σ_{i<j} wᵢwⱼσᵢσⱼ).
pub fn constant_correlation_volatility(weights: &[f64], vols: &[f64], rho: f64) -> f64 {
    let wv: Vec<f64> = weights.iter().zip(vols).map(|(w, v)| w * v).collect();
    let mut var = 0.0;
    for i in 0..wv.len() {
        var += wv[i] * wv[i];
        for j in (i + 1)..wv.len() {
            var += 2.0 * rho * wv[i] * wv[j];
        }
    }
    var.max(0.0).sqrt()
}

/// Drawdown estimate (%) from a 0–100 score.
pub fn drawdown_estimate(score: f64) -> f64 {
    if score > 70.0 {
        15.0
    } else if score > 50.0 {
        25.0
    } else {
        35.0
    }
}

pub fn compute_portfolio_risk(allocation: &PortfolioAllocation) -> PortfolioRiskMetrics {
    let rho = ASSUMED_AVERAGE_CORRELATION;
    let weights = allocation.weights();
    let vols: Vec<f64> = allocation
        .positions
        .iter()
        .map(|p| p.volatility_used)
        .collect();

    let sigma_p = constant_correlation_volatility(&weights, &vols, rho);
    let wv: Vec<f64> = weights.iter().zip(&vols).map(|(w, v)| w * v).collect();
    let weighted_average_volatility: f64 = wv.iter().sum();
    let wv_total = weighted_average_volatility;

    let concentration = herfindahl(&weights);
    let effective_n = if concentration > 0.0 {
        1.0 / concentration
    } else {
        0.0
    };

    let marginal_risk = allocation
        .positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let sigma_i = vols[i];
            // ∂σp/∂wᵢ = (wᵢσᵢ² + ρσᵢ Σ_{j≠i} wⱼσⱼ) / σp
            let others = wv_total - wv[i];
            let marginal = if sigma_p > 0.0 {
                (p.weight * sigma_i * sigma_i + rho * sigma_i * others) / sigma_p
            } else {
                0.0
            };
            let (risk_share_pct, standalone_pct) = if sigma_p > 0.0 {
                (
                    p.weight * marginal / sigma_p * 100.0,
                    wv[i] / sigma_p * 100.0,
                )
            } else {
                (0.0, 0.0)
            };
            MarginalRisk {
                ticker: p.asset.ticker.clone(),
                weight: p.weight,
                volatility: sigma_i,
                marginal_volatility: marginal,
                risk_share_pct,
                standalone_pct,
            }
        })
        .collect();

    let estimated_max_drawdown = allocation
        .positions
        .iter()
        .map(|p| p.weight * drawdown_estimate(p.asset.score))
        .sum();

    let daily_sigma = sigma_p / 100.0 / TRADING_DAYS_PER_YEAR.sqrt();
    let var_95 = Z_95 * daily_sigma * allocation.total_capital;
    let cvar_95 = ES_FACTOR_95 * daily_sigma * allocation.total_capital;

    PortfolioRiskMetrics {
        portfolio_volatility: sigma_p,
        weighted_average_volatility,
        diversification_ratio: if sigma_p > 0.0 {
            weighted_average_volatility / sigma_p
        } else {
            1.0
        },
        concentration,
        effective_n,
        estimated_max_drawdown,
        var_95,
        cvar_95,
        marginal_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocationConfig, AllocationMethod, Allocator};
    use chrono::{TimeZone, Utc};
    use pcg_schemas::Asset;

    fn alloc(specs: &[(f64, f64)], method: AllocationMethod) -> PortfolioAllocation {
        let assets: Vec<Asset> = specs
            .iter()
            .enumerate()
            .map(|(i, (score, vol))| Asset::new(format!("T{i}"), "t", *score).with_volatility(*vol))
            .collect();
        let cfg = AllocationConfig {
            min_assets_in_portfolio: 1,
            max_position_weight: 1.0,
            min_position_weight: 0.0,
            ..AllocationConfig::default()
        };
        Allocator::new(cfg)
            .allocate_at(&assets, method, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn single_asset_volatility_is_its_own() {
        let m = compute_portfolio_risk(&alloc(&[(80.0, 22.0)], AllocationMethod::EqualWeight));
        assert!((m.portfolio_volatility - 22.0).abs() < 1e-12);
        assert!((m.diversification_ratio - 1.0).abs() < 1e-12);
        assert!((m.marginal_risk[0].risk_share_pct - 100.0).abs() < 1e-9);
        assert_eq!(m.estimated_max_drawdown, 15.0);
    }

    #[test]
    fn two_equal_assets_closed_form() {
        // σp² = 2·(0.5·20)² + 2·0.3·(0.5·20)² = 260
        let m = compute_portfolio_risk(&alloc(
            &[(60.0, 20.0), (40.0, 20.0)],
            AllocationMethod::EqualWeight,
        ));
        assert!((m.portfolio_volatility - 260f64.sqrt()).abs() < 1e-9);
        assert!((m.effective_n - 2.0).abs() < 1e-12);
        assert!((m.estimated_max_drawdown - 30.0).abs() < 1e-12);
    }

    #[test]
    fn diversification_ratio_at_least_one() {
        let m = compute_portfolio_risk(&alloc(
            &[(90.0, 12.0), (70.0, 25.0), (30.0, 40.0), (55.0, 18.0)],
            AllocationMethod::Hybrid,
        ));
        assert!(m.diversification_ratio >= 1.0);
        assert!(m.portfolio_volatility < m.weighted_average_volatility);
    }

    #[test]
    fn euler_shares_sum_to_one_hundred() {
        let m = compute_portfolio_risk(&alloc(
            &[(90.0, 12.0), (70.0, 25.0), (30.0, 40.0)],
            AllocationMethod::ScoreWeighted,
        ));
        let total: f64 = m.marginal_risk.iter().map(|r| r.risk_share_pct).sum();
        assert!((total - 100.0).abs() < 1e-9, "total={total}");
        let standalone: f64 = m.marginal_risk.iter().map(|r| r.standalone_pct).sum();
        assert!((standalone - m.diversification_ratio * 100.0).abs() < 1e-9);
    }

    #[test]
    fn cvar_exceeds_var() {
        let m = compute_portfolio_risk(&alloc(
            &[(60.0, 20.0), (40.0, 30.0)],
            AllocationMethod::Erc,
        ));
        assert!(m.var_95 > 0.0);
        assert!(m.cvar_95 >= m.var_95);
    }

    #[test]
    fn drawdown_steps() {
        assert_eq!(drawdown_estimate(71.0), 15.0);
        assert_eq!(drawdown_estimate(70.0), 25.0);
        assert_eq!(drawdown_estimate(51.0), 25.0);
        assert_eq!(drawdown_estimate(50.0), 35.0);
    }
}
