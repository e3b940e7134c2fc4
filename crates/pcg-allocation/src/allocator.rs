//! pcg-allocation: allocator
//!
//! Turns a pre-ranked list of assets into a normalised weight vector.
//!
//! Pipeline (every method):
//!   1. validate config
//!   2. truncate to `max_assets_in_portfolio` (input order = caller's ranking)
//!   3. validate each selected asset, substitute default volatility
//!   4. raw weights per `AllocationMethod`
//!   5. `clip_and_normalize` into `[min_position_weight, max_position_weight]`
//!
//! Weights are dimensionless fractions of capital (1.0 = 100 %), long only.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pcg_schemas::{Asset, AssetError, Degradation, ErrorClass, Holding};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::WeightMap;

/// Tolerance used when comparing weights against their bounds.
const BOUND_EPS: f64 = 1e-12;

/// Bisection steps for the clip scale factor; converges to f64 resolution well before this.
const BISECTION_STEPS: usize = 200;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum AllocationError {
    /// A config field is out of its permitted range.
    InvalidConfig(String),
    /// Fewer assets than `min_assets_in_portfolio` survived truncation.
    TooFewAssets { available: usize, required: usize },
    /// Method name did not match any `AllocationMethod`.
    UnknownMethod(String),
    /// An input asset failed validation.
    InvalidAsset(AssetError),
}

impl AllocationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidConfig(_) | Self::TooFewAssets { .. } | Self::UnknownMethod(_) => {
                ErrorClass::Configuration
            }
            Self::InvalidAsset(e) => e.class(),
        }
    }
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid allocation config: {msg}"),
            Self::TooFewAssets {
                available,
                required,
            } => write!(
                f,
                "need at least {required} assets for allocation, got {available}"
            ),
            Self::UnknownMethod(name) => write!(
                f,
                "unknown allocation method '{name}' (expected one of: {})",
                AllocationMethod::ALL
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::InvalidAsset(e) => write!(f, "invalid asset: {e}"),
        }
    }
}

impl std::error::Error for AllocationError {}

impl From<AssetError> for AllocationError {
    fn from(e: AssetError) -> Self {
        Self::InvalidAsset(e)
    }
}

// ─── AllocationMethod ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// wᵢ = 1/n.
    EqualWeight,
    /// wᵢ ∝ scoreᵢ.
    ScoreWeighted,
    /// Approximate equal risk contribution: wᵢ ∝ 1/σᵢ, covariance ignored.
    Erc,
    /// wᵢ = (1/n)·(target/σᵢ)·(target/mean σ).
    VolatilityTarget,
    /// Mean of normalised `Erc` and `ScoreWeighted` weights.
    Hybrid,
}

impl AllocationMethod {
    pub const ALL: [AllocationMethod; 5] = [
        Self::EqualWeight,
        Self::ScoreWeighted,
        Self::Erc,
        Self::VolatilityTarget,
        Self::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EqualWeight => "equal_weight",
            Self::ScoreWeighted => "score_weighted",
            Self::Erc => "erc",
            Self::VolatilityTarget => "volatility_target",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationMethod {
    type Err = AllocationError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| AllocationError::UnknownMethod(s.to_string()))
    }
}

// ─── AllocationConfig ────────────────────────────────────────────────────────

/// Allocation parameters (`/allocation` config section).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocationConfig {
    pub max_assets_in_portfolio: usize,
    pub min_assets_in_portfolio: usize,
    pub min_position_weight: f64,
    pub max_position_weight: f64,
    /// Annualised %, used by `VolatilityTarget`.
    pub target_volatility: f64,
    /// Annualised %, substituted when an asset carries no volatility.
    pub default_volatility: f64,
    pub total_capital: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_assets_in_portfolio: 10,
            min_assets_in_portfolio: 3,
            min_position_weight: 0.02,
            max_position_weight: 0.40,
            target_volatility: 15.0,
            default_volatility: 20.0,
            total_capital: 100_000.0,
        }
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), AllocationError> {
        let bad = |msg: String| Err(AllocationError::InvalidConfig(msg));

        if self.min_assets_in_portfolio == 0 {
            return bad("min_assets_in_portfolio must be >= 1".into());
        }
        if self.max_assets_in_portfolio < self.min_assets_in_portfolio {
            return bad(format!(
                "max_assets_in_portfolio ({}) < min_assets_in_portfolio ({})",
                self.max_assets_in_portfolio, self.min_assets_in_portfolio
            ));
        }
        let (lo, hi) = (self.min_position_weight, self.max_position_weight);
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || hi <= 0.0 || hi > 1.0 || lo > hi {
            return bad(format!(
                "position weight bounds must satisfy 0 <= min <= max <= 1, max > 0 (got [{lo}, {hi}])"
            ));
        }
        for (name, v) in [
            ("total_capital", self.total_capital),
            ("target_volatility", self.target_volatility),
            ("default_volatility", self.default_volatility),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return bad(format!("{name} must be finite and > 0 (got {v})"));
            }
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocatedPosition {
    pub asset: Asset,
    /// Fraction of capital.
    pub weight: f64,
    pub weight_pct: f64,
    pub recommended_capital: f64,
    /// Annualised % actually used for this position (supplied or default).
    pub volatility_used: f64,
}

/// Immutable outcome of one `allocate` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub method: AllocationMethod,
    pub positions: Vec<AllocatedPosition>,
    pub total_capital: f64,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub warnings: Vec<Degradation>,
}

impl PortfolioAllocation {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p.weight).collect()
    }

    pub fn weight_map(&self) -> WeightMap {
        self.positions
            .iter()
            .map(|p| (p.asset.ticker.clone(), p.weight))
            .collect()
    }

    /// ticker → sector for positions that carry one.
    pub fn sector_map(&self) -> BTreeMap<String, String> {
        self.positions
            .iter()
            .filter_map(|p| {
                p.asset
                    .sector
                    .as_ref()
                    .map(|s| (p.asset.ticker.clone(), s.clone()))
            })
            .collect()
    }

    /// Holdings for the risk engine. The volatility actually used is written
    /// back so both engines see the same figure.
    pub fn holdings(&self) -> Vec<Holding> {
        self.positions
            .iter()
            .map(|p| {
                let mut asset = p.asset.clone();
                asset.volatility = Some(p.volatility_used);
                Holding::new(asset, p.weight)
            })
            .collect()
    }
}

// ─── Clip and renormalise ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct ClipOutcome {
    pub weights: Vec<f64>,
    /// At least one weight was moved to a bound.
    pub clipped: bool,
    /// Bounds were satisfiable for this many weights.
    pub feasible: bool,
}

/// Normalise `raw` to sum 1 and force every weight into `[min_w, max_w]`.
///
/// When every normalised weight is already in bounds it is returned as is.
/// Otherwise the result is `wᵢ = clamp(λ·rᵢ, min_w, max_w)` with λ chosen so
/// that Σwᵢ = 1: clamped positions sit at a bound and the residual is spread
/// over the rest in proportion to their raw weight. When no λ exists
/// (n·min_w > 1 or the caps cannot reach 1) a single clamp + rescale is applied
/// and `feasible` is false.
///
/// A non-positive or non-finite raw total falls back to equal weights.
pub fn clip_and_normalize(raw: &[f64], min_w: f64, max_w: f64) -> ClipOutcome {
    let n = raw.len();
    if n == 0 {
        return ClipOutcome {
            weights: Vec::new(),
            clipped: false,
            feasible: true,
        };
    }
    let nf = n as f64;
    let total: f64 = raw.iter().sum();
    let normalised: Vec<f64> = if total > 0.0 && total.is_finite() {
        raw.iter().map(|r| r / total).collect()
    } else {
        vec![1.0 / nf; n]
    };

    if normalised
        .iter()
        .all(|w| *w >= min_w - BOUND_EPS && *w <= max_w + BOUND_EPS)
    {
        return ClipOutcome {
            weights: normalised,
            clipped: false,
            feasible: true,
        };
    }

    let reachable_max: f64 = normalised
        .iter()
        .map(|w| if *w > 0.0 { max_w } else { min_w })
        .sum();
    let feasible =
        min_w <= max_w && nf * min_w <= 1.0 + BOUND_EPS && reachable_max >= 1.0 - BOUND_EPS;

    if !feasible {
        let clamped: Vec<f64> = normalised.iter().map(|w| bound(*w, min_w, max_w)).collect();
        let s: f64 = clamped.iter().sum();
        let weights = if s > 0.0 {
            clamped.iter().map(|w| w / s).collect()
        } else {
            vec![1.0 / nf; n]
        };
        return ClipOutcome {
            weights,
            clipped: true,
            feasible: false,
        };
    }

    // Σ clamp(λ·wᵢ) is monotone in λ: n·min at 0, reachable_max once the
    // smallest positive weight hits the cap.
    let smallest_positive = normalised
        .iter()
        .copied()
        .filter(|w| *w > 0.0)
        .fold(f64::INFINITY, f64::min);
    let mut lo = 0.0_f64;
    let mut hi = max_w / smallest_positive;
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if scaled_sum(&normalised, mid, min_w, max_w) < 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    ClipOutcome {
        weights: normalised
            .iter()
            .map(|w| bound(hi * w, min_w, max_w))
            .collect(),
        clipped: true,
        feasible: true,
    }
}

fn scaled_sum(weights: &[f64], scale: f64, min_w: f64, max_w: f64) -> f64 {
    weights.iter().map(|w| bound(scale * w, min_w, max_w)).sum()
}

// `f64::clamp` panics when min > max; infeasible input still has to produce weights.
fn bound(w: f64, min_w: f64, max_w: f64) -> f64 {
    w.max(min_w).min(max_w)
}

// ─── Allocator ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Allocator {
    config: AllocationConfig,
}

impl Allocator {
    pub fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Allocate stamped with the current wall-clock time.
    pub fn allocate(
        &self,
        assets: &[Asset],
        method: AllocationMethod,
    ) -> Result<PortfolioAllocation, AllocationError> {
        self.allocate_at(assets, method, Utc::now())
    }

    /// Allocate with an explicit provenance timestamp. Deterministic.
    pub fn allocate_at(
        &self,
        assets: &[Asset],
        method: AllocationMethod,
        generated_at: DateTime<Utc>,
    ) -> Result<PortfolioAllocation, AllocationError> {
        let cfg = &self.config;
        cfg.validate()?;

        let selected = &assets[..assets.len().min(cfg.max_assets_in_portfolio)];
        if selected.len() < cfg.min_assets_in_portfolio {
            return Err(AllocationError::TooFewAssets {
                available: selected.len(),
                required: cfg.min_assets_in_portfolio,
            });
        }
        for a in selected {
            a.validate()?;
        }

        let mut warnings = Vec::new();
        let vols: Vec<f64> = selected
            .iter()
            .map(|a| match a.volatility {
                Some(v) => v,
                None => {
                    warn!(ticker = %a.ticker, substituted = cfg.default_volatility, "asset has no volatility; using default");
                    warnings.push(Degradation::DefaultVolatility {
                        ticker: a.ticker.clone(),
                        substituted: cfg.default_volatility,
                    });
                    cfg.default_volatility
                }
            })
            .collect();

        let scores: Vec<f64> = selected.iter().map(|a| a.score).collect();
        let raw = raw_weights(method, &scores, &vols, cfg.target_volatility);
        let outcome = clip_and_normalize(
            &raw,
            cfg.min_position_weight,
            cfg.max_position_weight,
        );
        if !outcome.feasible {
            warn!(
                assets = selected.len(),
                min_weight = cfg.min_position_weight,
                max_weight = cfg.max_position_weight,
                "weight bounds infeasible; applied single clip and rescale"
            );
            warnings.push(Degradation::InfeasibleWeightBounds {
                assets: selected.len(),
                min_weight: cfg.min_position_weight,
                max_weight: cfg.max_position_weight,
            });
        }

        let positions: Vec<AllocatedPosition> = selected
            .iter()
            .zip(outcome.weights.iter().zip(vols.iter()))
            .map(|(asset, (&weight, &vol))| AllocatedPosition {
                asset: asset.clone(),
                weight,
                weight_pct: weight * 100.0,
                recommended_capital: weight * cfg.total_capital,
                volatility_used: vol,
            })
            .collect();

        debug!(
            method = %method,
            positions = positions.len(),
            clipped = outcome.clipped,
            "allocation computed"
        );

        Ok(PortfolioAllocation {
            method,
            positions,
            total_capital: cfg.total_capital,
            generated_at,
            warnings,
        })
    }
}

/// Un-normalised weights for `method`. All inputs have equal length and
/// volatilities are already validated positive.
fn raw_weights(method: AllocationMethod, scores: &[f64], vols: &[f64], target_vol: f64) -> Vec<f64> {
    let n = scores.len();
    match method {
        AllocationMethod::EqualWeight => vec![1.0; n],
        AllocationMethod::ScoreWeighted => score_weights(scores),
        AllocationMethod::Erc => vols.iter().map(|v| 1.0 / v).collect(),
        AllocationMethod::VolatilityTarget => {
            let mean_vol = vols.iter().sum::<f64>() / n as f64;
            vols.iter()
                .map(|v| (1.0 / n as f64) * (target_vol / v) * (target_vol / mean_vol))
                .collect()
        }
        AllocationMethod::Hybrid => {
            let erc = normalise(&vols.iter().map(|v| 1.0 / v).collect::<Vec<_>>());
            let score = normalise(&score_weights(scores));
            erc.iter().zip(score.iter()).map(|(e, s)| 0.5 * (e + s)).collect()
        }
    }
}

// All-zero scores carry no ranking information: fall back to equal weights.
fn score_weights(scores: &[f64]) -> Vec<f64> {
    if scores.iter().sum::<f64>() > 0.0 {
        scores.to_vec()
    } else {
        vec![1.0; scores.len()]
    }
}

fn normalise(raw: &[f64]) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    raw.iter().map(|r| r / total).collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
