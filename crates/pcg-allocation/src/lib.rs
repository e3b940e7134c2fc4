//! pcg-allocation
//!
//! Weight construction over a pre-ranked universe of scored assets.
//! - Five closed allocation policies (`AllocationMethod`)
//! - Shared clip-and-renormalise step honouring per-position bounds
//! - Constant-correlation risk approximation for the fast path
//! - Post-allocation constraint checks and turnover
//! - Pure deterministic logic (no IO; the clock is only read by `Allocator::allocate`)

mod allocator;
mod metrics;

pub mod constraints;

pub use allocator::{
    clip_and_normalize, AllocatedPosition, AllocationConfig, AllocationError, AllocationMethod,
    Allocator, ClipOutcome, PortfolioAllocation,
};
pub use constraints::{
    check_sector_limits, check_turnover, check_weight_bounds, compute_turnover,
    ConstraintViolation, SectorConstraint, TurnoverConstraint, WeightBoundsConstraint,
};
pub use metrics::{
    compute_portfolio_risk, constant_correlation_volatility, drawdown_estimate, MarginalRisk,
    PortfolioRiskMetrics, ASSUMED_AVERAGE_CORRELATION,
};

use std::collections::BTreeMap;

/// Canonical weight map type (ticker -> weight fraction).
pub type WeightMap = BTreeMap<String, f64>;
