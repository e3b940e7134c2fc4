use serde::{Deserialize, Serialize};

/// Non-fatal caveat attached to an otherwise valid result.
///
/// Rendered inline next to the output; never blocks an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Series had no date index and were aligned by position (tail aligned).
    PositionalAlignment { assets: usize, observations: usize },
    /// Estimated matrix was asymmetric beyond tolerance and was symmetrised.
    AsymmetricMatrix { max_deviation: f64 },
    /// A correlation diagonal entry drifted from 1 and was reset.
    NonUnitDiagonal { ticker: String, value: f64 },
    /// A covariance diagonal entry came out negative and was clamped to 0.
    NegativeVariance { ticker: String, value: f64 },
    /// Return series had zero variance; its correlations were set to zero.
    ZeroVariance { ticker: String },
    /// Missing volatility replaced by a default.
    DefaultVolatility { ticker: String, substituted: f64 },
    /// Weight bounds cannot hold for this many assets; single clip + rescale applied.
    InfeasibleWeightBounds {
        assets: usize,
        min_weight: f64,
        max_weight: f64,
    },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PositionalAlignment {
                assets,
                observations,
            } => write!(
                f,
                "{assets} series aligned by position over {observations} observations (no date index); less precise"
            ),
            Self::AsymmetricMatrix { max_deviation } => {
                write!(f, "matrix asymmetry {max_deviation:.3e} exceeded tolerance; symmetrised")
            }
            Self::NonUnitDiagonal { ticker, value } => {
                write!(f, "correlation diagonal {value:.6} for '{ticker}' reset to 1")
            }
            Self::NegativeVariance { ticker, value } => {
                write!(f, "negative variance {value:.3e} for '{ticker}'")
            }
            Self::ZeroVariance { ticker } => {
                write!(f, "'{ticker}' has zero return variance; correlations set to 0")
            }
            Self::DefaultVolatility {
                ticker,
                substituted,
            } => write!(f, "no volatility for '{ticker}'; assumed {substituted:.1}%"),
            Self::InfeasibleWeightBounds {
                assets,
                min_weight,
                max_weight,
            } => write!(
                f,
                "weight bounds [{min_weight:.4}, {max_weight:.4}] infeasible for {assets} assets"
            ),
        }
    }
}
