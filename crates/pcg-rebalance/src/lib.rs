//! pcg-rebalance
//!
//! Chronological rebalancing over dated price history. For each rebalance
//! date the universe is cut to prices on or before that date, volatility is
//! re-estimated from what is visible, and the allocator runs with the date as
//! its provenance timestamp. Snapshots are handed to a `SnapshotSink` one at
//! a time, in date order.

mod sink;

pub use sink::{JsonlSink, MemorySink, SnapshotSink};

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use pcg_allocation::{
    check_turnover, compute_turnover, AllocationConfig, AllocationError, AllocationMethod,
    Allocator, ConstraintViolation, PortfolioAllocation, TurnoverConstraint, WeightMap,
};
use pcg_md::realized_volatility;
use pcg_schemas::{Asset, ErrorClass};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ─── Config ──────────────────────────────────────────────────────────────────

/// Rebalancing parameters (`/rebalance` config section).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebalanceConfig {
    /// Most recent daily returns used for realised volatility; `None` uses
    /// all visible history.
    pub volatility_lookback: Option<usize>,
    /// When false the supplied volatility is always used.
    pub use_realized_volatility: bool,
    /// One-way turnover cap between consecutive snapshots. A breach is
    /// recorded on the snapshot; the rebalance itself still goes through.
    pub max_one_way_turnover: Option<f64>,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            volatility_lookback: Some(63),
            use_realized_volatility: true,
            max_one_way_turnover: None,
        }
    }
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<(), RebalanceError> {
        if let Some(n) = self.volatility_lookback {
            if n < 2 {
                return Err(RebalanceError::InvalidConfig(format!(
                    "volatility_lookback must be >= 2 (got {n})"
                )));
            }
        }
        if let Some(cap) = self.max_one_way_turnover {
            if !(cap > 0.0 && cap <= 1.0) {
                return Err(RebalanceError::InvalidConfig(format!(
                    "max_one_way_turnover must be in (0, 1] (got {cap})"
                )));
            }
        }
        Ok(())
    }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum RebalanceError {
    InvalidConfig(String),
    /// Rebalance dates must be strictly increasing.
    NonIncreasingDates {
        previous: NaiveDate,
        next: NaiveDate,
    },
    /// A price series without dates cannot be cut at a rebalance date.
    UndatedSeries { ticker: String },
    Allocation {
        date: NaiveDate,
        source: AllocationError,
    },
    /// The sink refused a snapshot; the run stops there.
    Sink { date: NaiveDate, message: String },
}

impl RebalanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidConfig(_) | Self::NonIncreasingDates { .. } | Self::Sink { .. } => {
                ErrorClass::Configuration
            }
            Self::UndatedSeries { .. } => ErrorClass::InvalidInput,
            Self::Allocation { source, .. } => source.class(),
        }
    }
}

impl std::fmt::Display for RebalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid rebalance config: {msg}"),
            Self::NonIncreasingDates { previous, next } => write!(
                f,
                "rebalance dates must be strictly increasing ({previous} then {next})"
            ),
            Self::UndatedSeries { ticker } => {
                write!(f, "price series for '{ticker}' has undated points")
            }
            Self::Allocation { date, source } => write!(f, "allocation at {date}: {source}"),
            Self::Sink { date, message } => write!(f, "snapshot sink at {date}: {message}"),
        }
    }
}

impl std::error::Error for RebalanceError {}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSnapshot {
    /// UUIDv5 over method, date, sequence and tickers. Stable across reruns.
    pub id: Uuid,
    pub sequence: usize,
    pub date: NaiveDate,
    pub allocation: PortfolioAllocation,
    /// One-way turnover against the previous snapshot; `None` on the first.
    pub turnover: Option<f64>,
    /// Turnover cap breaches against the previous snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ConstraintViolation>,
    /// Realised volatility (annualised %) estimated at this date, by ticker.
    /// Tickers missing here used their supplied volatility.
    pub realized_volatility: BTreeMap<String, f64>,
}

impl RebalanceSnapshot {
    pub fn weights(&self) -> WeightMap {
        self.allocation.weight_map()
    }
}

fn derive_snapshot_id(
    method: AllocationMethod,
    date: NaiveDate,
    sequence: usize,
    tickers: &[&str],
) -> Uuid {
    let data = format!(
        "pcg-rebalance.snapshot.v1|{}|{}|{}|{}",
        method.as_str(),
        date,
        sequence,
        tickers.join(",")
    );
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

// ─── Rebalancer ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Rebalancer {
    allocator: Allocator,
    config: RebalanceConfig,
}

impl Rebalancer {
    pub fn new(allocation: AllocationConfig, config: RebalanceConfig) -> Self {
        Self {
            allocator: Allocator::new(allocation),
            config,
        }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Rebalance on each of `dates` in order, persisting every snapshot to
    /// `sink` before moving on. Returns the snapshots that were persisted.
    pub fn run<S>(
        &self,
        assets: &[Asset],
        dates: &[NaiveDate],
        method: AllocationMethod,
        sink: &mut S,
    ) -> Result<Vec<RebalanceSnapshot>, RebalanceError>
    where
        S: SnapshotSink + ?Sized,
    {
        self.config.validate()?;
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(RebalanceError::NonIncreasingDates {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        if let Some(a) = assets
            .iter()
            .find(|a| !a.prices.is_empty() && !a.has_date_index())
        {
            return Err(RebalanceError::UndatedSeries {
                ticker: a.ticker.clone(),
            });
        }

        let mut snapshots: Vec<RebalanceSnapshot> = Vec::with_capacity(dates.len());
        let mut previous: Option<WeightMap> = None;

        for (sequence, &date) in dates.iter().enumerate() {
            let (visible, realized) = self.visible_universe(assets, date);
            let generated_at = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
            let allocation = self
                .allocator
                .allocate_at(&visible, method, generated_at)
                .map_err(|source| RebalanceError::Allocation { date, source })?;

            let weights = allocation.weight_map();
            let turnover = previous.as_ref().map(|p| compute_turnover(p, &weights));
            let violations = match (previous.as_ref(), self.config.max_one_way_turnover) {
                (Some(p), Some(cap)) => check_turnover(p, &weights, &TurnoverConstraint::new(cap)),
                _ => Vec::new(),
            };
            for v in &violations {
                warn!(%date, sequence, "{v}");
            }
            let tickers: Vec<&str> = allocation
                .positions
                .iter()
                .map(|p| p.asset.ticker.as_str())
                .collect();
            let snapshot = RebalanceSnapshot {
                id: derive_snapshot_id(method, date, sequence, &tickers),
                sequence,
                date,
                turnover,
                violations,
                realized_volatility: realized,
                allocation,
            };

            sink.persist(&snapshot)
                .map_err(|e| RebalanceError::Sink {
                    date,
                    message: format!("{e:#}"),
                })?;

            info!(
                %date,
                sequence,
                positions = snapshot.allocation.len(),
                turnover = snapshot.turnover.unwrap_or(0.0),
                "rebalance snapshot persisted"
            );
            previous = Some(weights);
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Assets as they were known at the close of `date`, with volatility
    /// re-estimated from the visible closes where possible.
    fn visible_universe(
        &self,
        assets: &[Asset],
        date: NaiveDate,
    ) -> (Vec<Asset>, BTreeMap<String, f64>) {
        let mut realized = BTreeMap::new();
        let visible = assets
            .iter()
            .map(|a| {
                let mut cut = a.as_of(date);
                if self.config.use_realized_volatility {
                    match realized_volatility(&cut.closes(), self.config.volatility_lookback) {
                        Some(v) if v.is_finite() && v > 0.0 => {
                            realized.insert(cut.ticker.clone(), v);
                            cut.volatility = Some(v);
                        }
                        _ => debug!(
                            ticker = %cut.ticker,
                            %date,
                            points = cut.prices.len(),
                            "not enough history for realised volatility; keeping supplied value"
                        ),
                    }
                }
                cut
            })
            .collect();
        (visible, realized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pcg_schemas::PricePoint;

    fn d(day: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day)
    }

    fn asset(ticker: &str, score: f64, amp: f64, days: i64) -> Asset {
        let mut px = 100.0;
        let prices = (0..days)
            .map(|t| {
                px *= 1.0 + amp * ((t as f64) * 1.3 + score).sin();
                PricePoint::dated(d(t), px)
            })
            .collect();
        Asset::new(ticker, ticker, score)
            .with_volatility(25.0)
            .with_prices(prices)
    }

    fn universe(days: i64) -> Vec<Asset> {
        vec![
            asset("AAA", 80.0, 0.004, days),
            asset("BBB", 60.0, 0.012, days),
            asset("CCC", 40.0, 0.025, days),
        ]
    }

    #[test]
    fn rejects_non_increasing_dates() {
        let err = Rebalancer::default()
            .run(&universe(30), &[d(20), d(20)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, RebalanceError::NonIncreasingDates { .. }));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn rejects_undated_series() {
        let mut assets = universe(30);
        assets[1].prices = vec![PricePoint::undated(10.0), PricePoint::undated(11.0)];
        let err = Rebalancer::default()
            .run(&assets, &[d(20)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap_err();
        assert_eq!(
            err,
            RebalanceError::UndatedSeries {
                ticker: "BBB".into()
            }
        );
        assert_eq!(err.class(), ErrorClass::InvalidInput);
    }

    #[test]
    fn realised_volatility_replaces_supplied_value() {
        let snaps = Rebalancer::default()
            .run(&universe(60), &[d(40)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        let s = &snaps[0];
        assert_eq!(s.realized_volatility.len(), 3);
        for p in &s.allocation.positions {
            let v = s.realized_volatility[&p.asset.ticker];
            assert_eq!(p.volatility_used, v);
        }
        // calmest series gets the largest erc weight
        let w = s.weights();
        assert!(w["AAA"] > w["CCC"]);
    }

    #[test]
    fn short_history_keeps_supplied_volatility() {
        let snaps = Rebalancer::default()
            .run(&universe(60), &[d(1)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        assert!(snaps[0].realized_volatility.is_empty());
        assert!(snaps[0]
            .allocation
            .positions
            .iter()
            .all(|p| p.volatility_used == 25.0));
    }

    #[test]
    fn disabled_realised_volatility_uses_supplied() {
        let cfg = RebalanceConfig {
            use_realized_volatility: false,
            ..RebalanceConfig::default()
        };
        let snaps = Rebalancer::new(AllocationConfig::default(), cfg)
            .run(&universe(60), &[d(40)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        assert!(snaps[0].realized_volatility.is_empty());
    }

    #[test]
    fn first_snapshot_has_no_turnover() {
        let snaps = Rebalancer::default()
            .run(
                &universe(90),
                &[d(30), d(60), d(89)],
                AllocationMethod::Hybrid,
                &mut MemorySink::new(),
            )
            .unwrap();
        assert!(snaps[0].turnover.is_none());
        assert!(snaps[1..]
            .iter()
            .all(|s| matches!(s.turnover, Some(t) if (0.0..=1.0).contains(&t))));
    }

    #[test]
    fn snapshot_ids_are_stable_and_distinct() {
        let r = Rebalancer::default();
        let dates = [d(30), d(60)];
        let a = r
            .run(&universe(90), &dates, AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        let b = r
            .run(&universe(90), &dates, AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].id, a[1].id);
        assert_eq!(a, b);
    }

    #[test]
    fn generated_at_is_the_rebalance_date() {
        let snaps = Rebalancer::default()
            .run(&universe(60), &[d(40)], AllocationMethod::EqualWeight, &mut MemorySink::new())
            .unwrap();
        assert_eq!(snaps[0].allocation.generated_at.date_naive(), d(40));
    }

    #[test]
    fn allocation_errors_carry_the_date() {
        let cfg = AllocationConfig {
            min_assets_in_portfolio: 5,
            ..AllocationConfig::default()
        };
        let err = Rebalancer::new(cfg, RebalanceConfig::default())
            .run(&universe(60), &[d(40)], AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, RebalanceError::Allocation { date, .. } if date == d(40)));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn lookback_below_two_is_rejected() {
        let cfg = RebalanceConfig {
            volatility_lookback: Some(1),
            ..RebalanceConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn turnover_cap_breach_is_recorded_on_the_snapshot() {
        // Day 1 has one visible return, so erc sees equal supplied volatility
        // and splits evenly; by day 89 AAA is far calmer and hits the 0.40 cap.
        let dates = [d(1), d(89)];
        let capped = RebalanceConfig {
            max_one_way_turnover: Some(0.05),
            ..RebalanceConfig::default()
        };
        let snaps = Rebalancer::new(AllocationConfig::default(), capped)
            .run(&universe(90), &dates, AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();

        assert!(snaps[0].violations.is_empty());
        let t = snaps[1].turnover.unwrap();
        assert!(t > 0.05, "turnover {t}");
        match snaps[1].violations.as_slice() {
            [ConstraintViolation::TurnoverExceeded { actual, limit }] => {
                assert_eq!(*limit, 0.05);
                assert!((actual - t).abs() < 1e-12);
            }
            other => panic!("unexpected violations: {other:?}"),
        }

        let loose = RebalanceConfig {
            max_one_way_turnover: Some(1.0),
            ..RebalanceConfig::default()
        };
        let snaps = Rebalancer::new(AllocationConfig::default(), loose)
            .run(&universe(90), &dates, AllocationMethod::Erc, &mut MemorySink::new())
            .unwrap();
        assert!(snaps.iter().all(|s| s.violations.is_empty()));
    }

    #[test]
    fn turnover_cap_outside_unit_interval_is_rejected() {
        for cap in [0.0, 1.5, f64::NAN] {
            let cfg = RebalanceConfig {
                max_one_way_turnover: Some(cap),
                ..RebalanceConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(RebalanceError::InvalidConfig(_))));
        }
    }
}
