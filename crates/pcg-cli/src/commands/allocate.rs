//! Allocation and risk-report command handlers.
//!
//! Covers `pcg allocate` and `pcg risk-report`.

use anyhow::{Context, Result};
use pcg_allocation::{
    check_sector_limits, check_weight_bounds, compute_portfolio_risk, AllocationConfig,
    AllocationMethod, Allocator, ConstraintViolation, PortfolioAllocation, PortfolioRiskMetrics,
    SectorConstraint, WeightBoundsConstraint,
};
use pcg_config::{ConfigScope, LoadedConfig};
use pcg_governance::RiskRules;
use pcg_risk::{RiskConfig, RiskEngine, RiskReport};
use serde::Serialize;
use tracing::info;

use super::{load_assets, load_config, print_json, ConfigArgs, UniverseArgs};

#[derive(Serialize)]
struct AllocateOutput {
    allocation: PortfolioAllocation,
    risk: PortfolioRiskMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_check: Option<LimitCheck>,
}

#[derive(Serialize)]
struct LimitCheck {
    rules: RiskRules,
    passed: bool,
    violations: Vec<ConstraintViolation>,
}

#[derive(Serialize)]
struct RiskReportOutput {
    allocation: PortfolioAllocation,
    report: RiskReport,
}

fn allocation_config(config: &LoadedConfig, capital: Option<f64>) -> Result<AllocationConfig> {
    let mut cfg: AllocationConfig = config.section("/allocation")?;
    if let Some(c) = capital {
        cfg.total_capital = c;
    }
    cfg.validate().context("invalid /allocation config")?;
    Ok(cfg)
}

fn run_allocation(
    config: &LoadedConfig,
    universe: &UniverseArgs,
    method: &str,
    capital: Option<f64>,
) -> Result<PortfolioAllocation> {
    let method: AllocationMethod = method.parse()?;
    let cfg = allocation_config(config, capital)?;
    let assets = load_assets(universe)?;
    let allocation = Allocator::new(cfg)
        .allocate(&assets, method)
        .with_context(|| format!("allocation failed (method={method})"))?;
    info!(
        method = %method,
        positions = allocation.len(),
        warnings = allocation.warnings.len(),
        "allocation complete"
    );
    Ok(allocation)
}

/// Governance baseline position and sector caps against an allocation.
fn check_limits(allocation: &PortfolioAllocation, rules: RiskRules) -> LimitCheck {
    let weights = allocation.weight_map();
    let mut violations = check_weight_bounds(
        &weights,
        &WeightBoundsConstraint::long_only(rules.max_position_weight),
    );
    violations.extend(check_sector_limits(
        &weights,
        &allocation.sector_map(),
        &SectorConstraint::new(rules.max_sector_weight),
    ));
    LimitCheck {
        passed: violations.is_empty(),
        rules,
        violations,
    }
}

/// Execute `pcg allocate`.
pub fn allocate(
    config_args: &ConfigArgs,
    universe: &UniverseArgs,
    method: &str,
    capital: Option<f64>,
    with_limit_check: bool,
) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Allocate)?;
    let allocation = run_allocation(&config, universe, method, capital)?;
    let risk = compute_portfolio_risk(&allocation);

    let limit_check = if with_limit_check {
        let rules: RiskRules = config.section("/governance/base_rules")?;
        rules
            .validate("base_rules")
            .context("invalid /governance/base_rules")?;
        Some(check_limits(&allocation, rules))
    } else {
        None
    };

    print_json(
        "allocate",
        &config,
        &AllocateOutput {
            allocation,
            risk,
            limit_check,
        },
    )
}

/// Execute `pcg risk-report`: allocate, then evaluate the allocation.
pub fn risk_report(
    config_args: &ConfigArgs,
    universe: &UniverseArgs,
    method: &str,
    capital: Option<f64>,
) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Risk)?;
    let risk_cfg: RiskConfig = config.section("/risk")?;
    let engine = RiskEngine::new(risk_cfg).context("invalid /risk config")?;

    let allocation = run_allocation(&config, universe, method, capital)?;
    let report = engine.generate_risk_report(&allocation.holdings(), allocation.total_capital);

    print_json(
        "risk-report",
        &config,
        &RiskReportOutput { allocation, report },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pcg_allocation::AllocatedPosition;
    use pcg_schemas::Asset;

    fn position(ticker: &str, sector: &str, weight: f64) -> AllocatedPosition {
        AllocatedPosition {
            asset: Asset::new(ticker, ticker, 50.0).with_sector(sector),
            weight,
            weight_pct: weight * 100.0,
            recommended_capital: weight * 100_000.0,
            volatility_used: 20.0,
        }
    }

    #[test]
    fn limit_check_flags_position_and_sector_breaches() {
        let allocation = PortfolioAllocation {
            method: AllocationMethod::ScoreWeighted,
            positions: vec![
                position("AAA", "tech", 0.40),
                position("BBB", "tech", 0.30),
                position("CCC", "energy", 0.30),
            ],
            total_capital: 100_000.0,
            generated_at: Utc::now(),
            warnings: vec![],
        };
        let check = check_limits(&allocation, RiskRules::default());
        assert!(!check.passed);
        assert!(check.violations.iter().any(|v| matches!(
            v,
            ConstraintViolation::SectorExceeded { sector, .. } if sector == "tech"
        )));
        assert_eq!(
            check
                .violations
                .iter()
                .filter(|v| matches!(v, ConstraintViolation::WeightTooLarge { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn capital_override_applies() {
        let config = LoadedConfig::empty().unwrap();
        let cfg = allocation_config(&config, Some(2_500_000.0)).unwrap();
        assert_eq!(cfg.total_capital, 2_500_000.0);
        assert!(allocation_config(&config, Some(-1.0)).is_err());
    }
}
