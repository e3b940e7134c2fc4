//! Correlation and covariance estimation.
//!
//! ## Pipeline
//!
//! 1. Align close series: intersection of dates when every point is dated,
//!    otherwise the common tail by position (less precise, flagged).
//! 2. Simple daily returns, Pearson sample correlation.
//! 3. Shrink toward the average off-diagonal correlation with intensity
//!    δ = N / (N + T).
//! 4. Sanity checks on the returned correlation and covariance: symmetry,
//!    unit correlation diagonal, non-negative variances. Each breach is
//!    repaired and reported as a warning, never a failure.
//!
//! Covariance is built from the shrunk correlation and daily return standard
//! deviations: Σᵢⱼ = ρᵢⱼ·sᵢ·sⱼ. The distance matrix dᵢⱼ = √(2(1 − ρᵢⱼ)) uses the
//! raw (unshrunk) correlation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use nalgebra::DMatrix;
use pcg_schemas::{Asset, Degradation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{RiskConfig, RiskError};

/// Standard deviations at or below this are treated as zero variance.
const ZERO_VARIANCE_EPS: f64 = 1e-14;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Intersection of dates across all series.
    Dated,
    /// Most recent common-length tail, by position.
    Positional,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlignedCloses {
    pub alignment: Alignment,
    /// Common dates (empty for positional alignment).
    pub dates: Vec<NaiveDate>,
    /// One close series per asset, same length, input order.
    pub closes: Vec<Vec<f64>>,
}

impl AlignedCloses {
    pub fn observations(&self) -> usize {
        self.closes.first().map_or(0, Vec::len)
    }
}

/// Off-diagonal summary statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

impl CorrelationStats {
    pub fn of(m: &DMatrix<f64>) -> Self {
        let n = m.nrows();
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for i in 0..n {
            for j in (i + 1)..n {
                let v = m[(i, j)];
                sum += v;
                count += 1;
                max = max.max(v);
                min = min.min(v);
            }
        }
        if count == 0 {
            return Self {
                average: 0.0,
                max: 0.0,
                min: 0.0,
            };
        }
        Self {
            average: sum / count as f64,
            max,
            min,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationAnalysis {
    pub tickers: Vec<String>,
    /// Shrunk correlation.
    pub correlation: DMatrix<f64>,
    /// Daily covariance from the shrunk correlation.
    pub covariance: DMatrix<f64>,
    pub raw_correlation: DMatrix<f64>,
    pub distance: DMatrix<f64>,
    pub stats: CorrelationStats,
    /// Aligned price observations per asset.
    pub observations: usize,
    pub shrinkage_intensity: f64,
    pub alignment: Alignment,
    /// Daily return standard deviation per asset.
    pub daily_volatility: Vec<f64>,
    pub warnings: Vec<Degradation>,
}

impl CorrelationAnalysis {
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Row-major copy of a matrix, for serialisation.
    pub fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
        (0..m.nrows())
            .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
            .collect()
    }
}

/// Align close series across assets. See module docs for the rules.
pub fn align_closes(assets: &[Asset]) -> AlignedCloses {
    if assets.iter().all(Asset::has_date_index) {
        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for a in assets {
            let dates: BTreeSet<NaiveDate> = a.prices.iter().filter_map(|p| p.date).collect();
            common = Some(match common {
                None => dates,
                Some(c) => c.intersection(&dates).copied().collect(),
            });
        }
        let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();
        let closes = assets
            .iter()
            .map(|a| {
                let by_date: BTreeMap<NaiveDate, f64> = a
                    .prices
                    .iter()
                    .filter_map(|p| p.date.map(|d| (d, p.close)))
                    .collect();
                dates.iter().filter_map(|d| by_date.get(d).copied()).collect()
            })
            .collect();
        AlignedCloses {
            alignment: Alignment::Dated,
            dates,
            closes,
        }
    } else {
        let len = assets.iter().map(|a| a.prices.len()).min().unwrap_or(0);
        let closes = assets
            .iter()
            .map(|a| {
                a.prices[a.prices.len() - len..]
                    .iter()
                    .map(|p| p.close)
                    .collect()
            })
            .collect();
        AlignedCloses {
            alignment: Alignment::Positional,
            dates: Vec::new(),
            closes,
        }
    }
}

/// Replace `m` by (m + mᵀ)/2 when max |mᵢⱼ − mⱼᵢ| exceeds `tolerance`.
/// Returns the deviation found when it did.
pub fn symmetrise(m: &mut DMatrix<f64>, tolerance: f64) -> Option<f64> {
    let n = m.nrows();
    let mut max_dev = 0.0_f64;
    for i in 0..n {
        for j in (i + 1)..n {
            max_dev = max_dev.max((m[(i, j)] - m[(j, i)]).abs());
        }
    }
    if max_dev > tolerance {
        let sym = (&*m + m.transpose()) * 0.5;
        *m = sym;
        Some(max_dev)
    } else {
        None
    }
}

/// Check and repair a finished estimate in place.
///
/// Symmetrises either matrix when it is asymmetric beyond `tolerance`, resets
/// correlation diagonal entries that drifted from 1, and clamps negative
/// covariance diagonal entries to 0. `tickers` index both matrices.
pub fn validate_estimate(
    correlation: &mut DMatrix<f64>,
    covariance: &mut DMatrix<f64>,
    tickers: &[String],
    tolerance: f64,
) -> Vec<Degradation> {
    let mut warnings = Vec::new();

    for m in [&mut *correlation, &mut *covariance] {
        if let Some(max_deviation) = symmetrise(m, tolerance) {
            warn!(max_deviation, "estimated matrix asymmetric; symmetrised");
            warnings.push(Degradation::AsymmetricMatrix { max_deviation });
        }
    }

    for (i, ticker) in tickers.iter().enumerate().take(correlation.nrows()) {
        let v = correlation[(i, i)];
        if (v - 1.0).abs() > tolerance {
            warn!(ticker = %ticker, value = v, "correlation diagonal not 1; reset");
            warnings.push(Degradation::NonUnitDiagonal {
                ticker: ticker.clone(),
                value: v,
            });
            correlation[(i, i)] = 1.0;
        }
    }

    for (i, ticker) in tickers.iter().enumerate().take(covariance.nrows()) {
        let v = covariance[(i, i)];
        if v < 0.0 {
            warn!(ticker = %ticker, value = v, "negative covariance diagonal; clamped to 0");
            warnings.push(Degradation::NegativeVariance {
                ticker: ticker.clone(),
                value: v,
            });
            covariance[(i, i)] = 0.0;
        }
    }

    warnings
}

pub fn calculate_correlation_matrix(
    assets: &[Asset],
    config: &RiskConfig,
) -> Result<CorrelationAnalysis, RiskError> {
    config.validate()?;
    if assets.len() < 2 {
        return Err(RiskError::TooFewAssets {
            got: assets.len(),
            required: 2,
        });
    }
    for a in assets {
        a.validate()?;
    }

    let n = assets.len();
    let tickers: Vec<String> = assets.iter().map(|a| a.ticker.clone()).collect();
    let mut warnings = Vec::new();

    let aligned = align_closes(assets);
    let observations = aligned.observations();
    if aligned.alignment == Alignment::Positional {
        warn!(
            assets = n,
            observations, "price series lack a date index; aligning by position"
        );
        warnings.push(Degradation::PositionalAlignment {
            assets: n,
            observations,
        });
    }
    if observations < config.min_observations {
        return Err(RiskError::InsufficientData {
            observations,
            required: config.min_observations,
        });
    }

    let returns: Vec<Vec<f64>> = aligned
        .closes
        .iter()
        .map(|c| c.windows(2).map(|w| w[1] / w[0] - 1.0).collect())
        .collect();
    let t = observations - 1;
    let tf = t as f64;

    let means: Vec<f64> = returns.iter().map(|r| r.iter().sum::<f64>() / tf).collect();
    let stds: Vec<f64> = returns
        .iter()
        .zip(&means)
        .map(|(r, m)| (r.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (tf - 1.0)).sqrt())
        .collect();

    let zero_var: Vec<bool> = stds
        .iter()
        .map(|s| !s.is_finite() || *s <= ZERO_VARIANCE_EPS)
        .collect();
    for (i, z) in zero_var.iter().enumerate() {
        if *z {
            warn!(ticker = %tickers[i], "zero return variance; correlations set to 0");
            warnings.push(Degradation::ZeroVariance {
                ticker: tickers[i].clone(),
            });
        }
    }

    let mut raw = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let rho = if zero_var[i] || zero_var[j] {
                0.0
            } else {
                let cov = returns[i]
                    .iter()
                    .zip(&returns[j])
                    .map(|(a, b)| (a - means[i]) * (b - means[j]))
                    .sum::<f64>()
                    / (tf - 1.0);
                (cov / (stds[i] * stds[j])).clamp(-1.0, 1.0)
            };
            raw[(i, j)] = rho;
            raw[(j, i)] = rho;
        }
    }

    let target = CorrelationStats::of(&raw).average;
    let shrinkage_intensity = n as f64 / (n as f64 + tf);
    let mut correlation = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            (1.0 - shrinkage_intensity) * raw[(i, j)] + shrinkage_intensity * target
        }
    });

    let daily_volatility: Vec<f64> = stds
        .iter()
        .zip(&zero_var)
        .map(|(s, z)| if *z { 0.0 } else { *s })
        .collect();
    let mut covariance = DMatrix::from_fn(n, n, |i, j| {
        correlation[(i, j)] * daily_volatility[i] * daily_volatility[j]
    });
    warnings.extend(validate_estimate(
        &mut correlation,
        &mut covariance,
        &tickers,
        config.symmetry_tolerance,
    ));

    let distance = raw.map(|r| (2.0 * (1.0 - r)).max(0.0).sqrt());
    let stats = CorrelationStats::of(&correlation);

    debug!(
        assets = n,
        observations,
        shrinkage_intensity,
        average = stats.average,
        "correlation estimated"
    );

    Ok(CorrelationAnalysis {
        tickers,
        correlation,
        covariance,
        raw_correlation: raw,
        distance,
        stats,
        observations,
        shrinkage_intensity,
        alignment: aligned.alignment,
        daily_volatility,
        warnings,
    })
}
