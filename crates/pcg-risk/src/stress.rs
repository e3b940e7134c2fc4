//! Market-drop stress scenarios.
//!
//! Each position's loss is its value × beta × market drop, with
//! beta = volatility / reference volatility, and never more than the position
//! value itself. Scenarios are ordered by severity, so total loss is
//! non-decreasing down the list.

use pcg_schemas::{Degradation, Holding};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{validate_capital, validate_holdings, RiskConfig, RiskError};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StressScenario {
    pub name: &'static str,
    /// Broad-market drop as a fraction (0.10 = −10 %).
    pub market_drop: f64,
}

pub const STRESS_SCENARIOS: [StressScenario; 4] = [
    StressScenario {
        name: "Market Correction",
        market_drop: 0.10,
    },
    StressScenario {
        name: "Bear Market",
        market_drop: 0.20,
    },
    StressScenario {
        name: "Market Crash",
        market_drop: 0.35,
    },
    StressScenario {
        name: "Black Swan",
        market_drop: 0.50,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionLoss {
    pub ticker: String,
    pub position_value: f64,
    pub beta: f64,
    pub loss: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario: String,
    pub market_drop_pct: f64,
    pub estimated_loss: f64,
    pub loss_pct: f64,
    pub remaining_capital: f64,
    /// Largest losses first.
    pub worst_positions: Vec<PositionLoss>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressTestReport {
    pub results: Vec<StressTestResult>,
    pub warnings: Vec<Degradation>,
}

pub fn run_stress_test(
    holdings: &[Holding],
    capital: f64,
    config: &RiskConfig,
) -> Result<StressTestReport, RiskError> {
    config.validate()?;
    validate_capital(capital)?;
    if holdings.is_empty() {
        return Err(RiskError::TooFewAssets {
            got: 0,
            required: 1,
        });
    }
    validate_holdings(holdings)?;

    let mut warnings = Vec::new();
    let betas: Vec<f64> = holdings
        .iter()
        .map(|h| {
            let vol = match h.asset.volatility {
                Some(v) => v,
                None => {
                    warn!(ticker = %h.asset.ticker, substituted = config.default_volatility, "holding has no volatility; using default for stress beta");
                    warnings.push(Degradation::DefaultVolatility {
                        ticker: h.asset.ticker.clone(),
                        substituted: config.default_volatility,
                    });
                    config.default_volatility
                }
            };
            vol / config.stress_reference_volatility
        })
        .collect();

    let results = STRESS_SCENARIOS
        .iter()
        .map(|scenario| {
            let mut losses: Vec<PositionLoss> = holdings
                .iter()
                .zip(&betas)
                .map(|(h, &beta)| {
                    let position_value = h.weight * capital;
                    PositionLoss {
                        ticker: h.asset.ticker.clone(),
                        position_value,
                        beta,
                        loss: (position_value * beta * scenario.market_drop).min(position_value),
                    }
                })
                .collect();

            let estimated_loss: f64 = losses.iter().map(|l| l.loss).sum();
            losses.sort_by(|a, b| b.loss.total_cmp(&a.loss).then_with(|| a.ticker.cmp(&b.ticker)));
            losses.truncate(config.worst_positions);

            StressTestResult {
                scenario: scenario.name.to_string(),
                market_drop_pct: scenario.market_drop * 100.0,
                estimated_loss,
                loss_pct: estimated_loss / capital * 100.0,
                remaining_capital: capital - estimated_loss,
                worst_positions: losses,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        scenarios = results.len(),
        worst_loss = results.last().map_or(0.0, |r| r.estimated_loss),
        "stress test complete"
    );

    Ok(StressTestReport { results, warnings })
}
