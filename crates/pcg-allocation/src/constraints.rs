//! pcg-allocation: constraints
//!
//! Post-allocation constraint verification:
//!   - Weight bounds  (per-position min/max, portfolio total)
//!   - Sector limits  (aggregate weight per sector)
//!   - Turnover limit (one-way turnover vs previous weights)
//!
//! The `Allocator` enforces position bounds *during* construction; this module
//! checks a finished weight map *after the fact* (typically against dynamic
//! governance limits) and reports every breach.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::WeightMap;

const TOLERANCE: f64 = 1e-12;

// ─── ConstraintViolation ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintViolation {
    WeightTooLarge {
        ticker: String,
        weight: f64,
        limit: f64,
    },
    WeightTooSmall {
        ticker: String,
        weight: f64,
        limit: f64,
    },
    /// Σwᵢ exceeds its limit (leverage).
    TotalWeightExceeded { actual: f64, limit: f64 },
    SectorExceeded {
        sector: String,
        actual: f64,
        limit: f64,
    },
    TurnoverExceeded { actual: f64, limit: f64 },
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightTooLarge {
                ticker,
                weight,
                limit,
            } => write!(f, "weight {weight:.4} for '{ticker}' exceeds max {limit:.4}"),
            Self::WeightTooSmall {
                ticker,
                weight,
                limit,
            } => write!(f, "weight {weight:.4} for '{ticker}' below min {limit:.4}"),
            Self::TotalWeightExceeded { actual, limit } => {
                write!(f, "total weight {actual:.4} exceeds limit {limit:.4}")
            }
            Self::SectorExceeded {
                sector,
                actual,
                limit,
            } => write!(f, "sector '{sector}' weight {actual:.4} exceeds limit {limit:.4}"),
            Self::TurnoverExceeded { actual, limit } => {
                write!(f, "one-way turnover {actual:.4} exceeds limit {limit:.4}")
            }
        }
    }
}

// ─── WeightBoundsConstraint ───────────────────────────────────────────────────

/// `None` means unconstrained on that dimension.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightBoundsConstraint {
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    /// Maximum Σwᵢ.
    pub max_total_weight: Option<f64>,
}

impl WeightBoundsConstraint {
    /// Fully invested long-only book with a per-position cap.
    pub fn long_only(max_weight: f64) -> Self {
        Self {
            min_weight: Some(0.0),
            max_weight: Some(max_weight),
            max_total_weight: Some(1.0),
        }
    }
}

pub fn check_weight_bounds(
    weights: &WeightMap,
    constraint: &WeightBoundsConstraint,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    for (ticker, &w) in weights {
        if let Some(mn) = constraint.min_weight {
            if w < mn - TOLERANCE {
                violations.push(ConstraintViolation::WeightTooSmall {
                    ticker: ticker.clone(),
                    weight: w,
                    limit: mn,
                });
            }
        }
        if let Some(mx) = constraint.max_weight {
            if w > mx + TOLERANCE {
                violations.push(ConstraintViolation::WeightTooLarge {
                    ticker: ticker.clone(),
                    weight: w,
                    limit: mx,
                });
            }
        }
    }

    if let Some(limit) = constraint.max_total_weight {
        let total: f64 = weights.values().sum();
        // Weight vectors are normalised to 1 ± float noise.
        if total > limit + 1e-9 {
            violations.push(ConstraintViolation::TotalWeightExceeded {
                actual: total,
                limit,
            });
        }
    }

    violations
}

// ─── SectorConstraint ────────────────────────────────────────────────────────

/// Aggregate weight cap applied to every sector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorConstraint {
    pub max_sector_weight: f64,
}

impl SectorConstraint {
    pub fn new(max_sector_weight: f64) -> Self {
        Self { max_sector_weight }
    }
}

/// `sector_map`: ticker → sector. Tickers without a sector are ignored.
pub fn check_sector_limits(
    weights: &WeightMap,
    sector_map: &BTreeMap<String, String>,
    constraint: &SectorConstraint,
) -> Vec<ConstraintViolation> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for (ticker, &w) in weights {
        if let Some(sector) = sector_map.get(ticker) {
            *totals.entry(sector.as_str()).or_insert(0.0) += w;
        }
    }

    let limit = constraint.max_sector_weight;
    totals
        .into_iter()
        .filter_map(|(sector, actual)| {
            (actual > limit + TOLERANCE).then(|| ConstraintViolation::SectorExceeded {
                sector: sector.to_string(),
                actual,
                limit,
            })
        })
        .collect()
}

// ─── Turnover ────────────────────────────────────────────────────────────────

/// One-way turnover Σ|w_target,i − w_current,i| / 2.
///
/// The fraction of capital that changes hands moving from `current` to
/// `target`. Tickers absent from a map count as weight 0.
pub fn compute_turnover(current: &WeightMap, target: &WeightMap) -> f64 {
    let tickers: BTreeSet<&str> = current
        .keys()
        .chain(target.keys())
        .map(String::as_str)
        .collect();

    let sum_abs_diff: f64 = tickers
        .iter()
        .map(|t| {
            let cur = current.get(*t).copied().unwrap_or(0.0);
            let tgt = target.get(*t).copied().unwrap_or(0.0);
            (tgt - cur).abs()
        })
        .sum();

    sum_abs_diff / 2.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnoverConstraint {
    pub max_one_way_turnover: f64,
}

impl TurnoverConstraint {
    pub fn new(max_one_way_turnover: f64) -> Self {
        Self {
            max_one_way_turnover,
        }
    }
}

pub fn check_turnover(
    current: &WeightMap,
    target: &WeightMap,
    constraint: &TurnoverConstraint,
) -> Vec<ConstraintViolation> {
    let turnover = compute_turnover(current, target);
    if turnover > constraint.max_one_way_turnover + TOLERANCE {
        vec![ConstraintViolation::TurnoverExceeded {
            actual: turnover,
            limit: constraint.max_one_way_turnover,
        }]
    } else {
        vec![]
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
