//! Universe file loading.
//!
//! A universe is a ranked list of scored instruments as produced by the
//! upstream scanner. YAML and JSON are both accepted (JSON is valid YAML).
//!
//! ```yaml
//! - ticker: AAPL
//!   name: Apple Inc.
//!   score: 88
//!   volatility: 24.5
//!   sector: Technology
//! ```
//!
//! File order is preserved: the allocator truncates in input order.

use std::path::Path;

use anyhow::{Context, Result};
use pcg_schemas::Asset;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::PriceHistory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl From<UniverseEntry> for Asset {
    fn from(e: UniverseEntry) -> Self {
        let name = e.name.unwrap_or_else(|| e.ticker.clone());
        Asset {
            ticker: e.ticker,
            name,
            sector: e.sector,
            prices: Vec::new(),
            volatility: e.volatility,
            score: e.score,
        }
    }
}

pub fn load_universe(path: &Path) -> Result<Vec<Asset>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read universe file: {}", path.display()))?;
    parse_universe_str(&raw).with_context(|| format!("invalid universe file: {}", path.display()))
}

pub fn parse_universe_str(raw: &str) -> Result<Vec<Asset>> {
    let entries: Vec<UniverseEntry> =
        serde_yaml::from_str(raw).context("universe must be a list of entries")?;
    Ok(entries.into_iter().map(Asset::from).collect())
}

/// Attach loaded price series to assets by ticker. Assets without a series
/// keep an empty price list.
pub fn attach_prices(assets: Vec<Asset>, history: &PriceHistory) -> Vec<Asset> {
    assets
        .into_iter()
        .map(|a| match history.get(&a.ticker) {
            Some(series) => a.with_prices(series.clone()),
            None => {
                warn!(ticker = %a.ticker, "no price history for asset");
                a
            }
        })
        .collect()
}
