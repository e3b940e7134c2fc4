use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ErrorClass;

// ─── PricePoint ───────────────────────────────────────────────────────────────

/// One daily observation. `date` is optional: series without a date index
/// can only be aligned positionally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
}

impl PricePoint {
    pub fn dated(date: NaiveDate, close: f64) -> Self {
        Self {
            date: Some(date),
            close,
            high: None,
            low: None,
        }
    }

    pub fn undated(close: f64) -> Self {
        Self {
            date: None,
            close,
            high: None,
            low: None,
        }
    }

    pub fn with_range(mut self, high: f64, low: f64) -> Self {
        self.high = Some(high);
        self.low = Some(low);
        self
    }
}

// ─── AssetError ───────────────────────────────────────────────────────────────

/// Validation failures for upstream asset records.
#[derive(Clone, Debug, PartialEq)]
pub enum AssetError {
    EmptyTicker,
    /// Score is NaN/inf or outside [0, 100].
    InvalidScore { ticker: String, score: f64 },
    /// Volatility is present but NaN/inf or not strictly positive.
    InvalidVolatility { ticker: String, value: f64 },
    /// A price field is NaN/inf or a close is not strictly positive.
    InvalidPrice {
        ticker: String,
        index: usize,
        field: &'static str,
        value: f64,
    },
}

impl AssetError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::InvalidInput
    }
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTicker => write!(f, "asset ticker must not be empty"),
            Self::InvalidScore { ticker, score } => {
                write!(f, "score {score} for '{ticker}' must be finite and within [0, 100]")
            }
            Self::InvalidVolatility { ticker, value } => {
                write!(f, "volatility {value} for '{ticker}' must be finite and > 0")
            }
            Self::InvalidPrice {
                ticker,
                index,
                field,
                value,
            } => write!(
                f,
                "price point {index} of '{ticker}': invalid {field} value {value}"
            ),
        }
    }
}

impl std::error::Error for AssetError {}

// ─── Asset ────────────────────────────────────────────────────────────────────

/// A scored instrument supplied by the upstream scanner.
///
/// `volatility` is annualised and expressed in percent (20.0 = 20 %).
/// `score` is a 0–100 quality score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
    pub score: f64,
}

impl Asset {
    pub fn new<T: Into<String>, N: Into<String>>(ticker: T, name: N, score: f64) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            sector: None,
            prices: Vec::new(),
            volatility: None,
            score,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = Some(volatility);
        self
    }

    pub fn with_sector<S: Into<String>>(mut self, sector: S) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_prices(mut self, prices: Vec<PricePoint>) -> Self {
        self.prices = prices;
        self
    }

    /// True when every price point carries a date.
    pub fn has_date_index(&self) -> bool {
        !self.prices.is_empty() && self.prices.iter().all(|p| p.date.is_some())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.prices.iter().map(|p| p.close).collect()
    }

    /// Copy of this asset with prices restricted to points dated on or before
    /// `as_of`. Undated points are dropped.
    pub fn as_of(&self, as_of: NaiveDate) -> Asset {
        let prices = self
            .prices
            .iter()
            .filter(|p| matches!(p.date, Some(d) if d <= as_of))
            .cloned()
            .collect();
        Asset {
            prices,
            ..self.clone()
        }
    }

    /// Fail-fast validation of the upstream contract. Values are never coerced.
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.ticker.trim().is_empty() {
            return Err(AssetError::EmptyTicker);
        }
        if !self.score.is_finite() || !(0.0..=100.0).contains(&self.score) {
            return Err(AssetError::InvalidScore {
                ticker: self.ticker.clone(),
                score: self.score,
            });
        }
        if let Some(v) = self.volatility {
            if !v.is_finite() || v <= 0.0 {
                return Err(AssetError::InvalidVolatility {
                    ticker: self.ticker.clone(),
                    value: v,
                });
            }
        }
        for (i, p) in self.prices.iter().enumerate() {
            if !p.close.is_finite() || p.close <= 0.0 {
                return Err(self.price_error(i, "close", p.close));
            }
            if let Some(h) = p.high {
                if !h.is_finite() {
                    return Err(self.price_error(i, "high", h));
                }
            }
            if let Some(l) = p.low {
                if !l.is_finite() {
                    return Err(self.price_error(i, "low", l));
                }
            }
        }
        Ok(())
    }

    fn price_error(&self, index: usize, field: &'static str, value: f64) -> AssetError {
        AssetError::InvalidPrice {
            ticker: self.ticker.clone(),
            index,
            field,
            value,
        }
    }
}

// ─── Holding ──────────────────────────────────────────────────────────────────

/// An asset together with its portfolio weight (fraction of capital).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: Asset,
    pub weight: f64,
}

impl Holding {
    pub fn new(asset: Asset, weight: f64) -> Self {
        Self { asset, weight }
    }
}
