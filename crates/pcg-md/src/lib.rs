//! pcg-md
//!
//! Read-side adapters for upstream market data:
//! - price history CSV → per-symbol `PricePoint` series
//! - universe file (YAML or JSON) → scored `Asset` records
//! - realized volatility from a close series
//!
//! Nothing here feeds the engines implicitly; callers load, then pass values in.

pub mod prices;
pub mod universe;

pub use prices::{parse_prices_file, parse_prices_str, CsvLoadError, PriceHistory};
pub use universe::{attach_prices, load_universe, parse_universe_str, UniverseEntry};

/// Trading days per year used to annualise daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualised realised volatility in percent from a close series.
///
/// Uses log returns over the most recent `lookback` returns (all when `None`)
/// and the sample standard deviation. Returns `None` with fewer than two
/// returns or any non-positive close.
pub fn realized_volatility(closes: &[f64], lookback: Option<usize>) -> Option<f64> {
    if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
        return None;
    }
    let mut returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if let Some(n) = lookback {
        if returns.len() > n {
            returns.drain(..returns.len() - n);
        }
    }
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_prices_have_zero_volatility() {
        let v = realized_volatility(&[10.0, 10.0, 10.0, 10.0], None).unwrap();
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn too_few_returns_is_none() {
        assert!(realized_volatility(&[10.0, 11.0], None).is_none());
        assert!(realized_volatility(&[], None).is_none());
    }

    #[test]
    fn non_positive_close_is_none() {
        assert!(realized_volatility(&[10.0, 0.0, 11.0, 12.0], None).is_none());
    }

    #[test]
    fn lookback_uses_most_recent_returns() {
        // Wild early history, calm recent history.
        let closes = [100.0, 150.0, 80.0, 120.0, 120.0, 120.5, 121.0, 121.5];
        let full = realized_volatility(&closes, None).unwrap();
        let recent = realized_volatility(&closes, Some(3)).unwrap();
        assert!(recent < full, "recent={recent} full={full}");
    }

    #[test]
    fn alternating_returns_annualise() {
        // log returns alternate +x / -x; sample std is known in closed form.
        let up = 1.01_f64;
        let closes = [100.0, 100.0 * up, 100.0, 100.0 * up, 100.0];
        let x = up.ln();
        let returns = [x, -x, x, -x];
        let var = returns.iter().map(|r| r * r).sum::<f64>() / 3.0;
        let expected = var.sqrt() * 252f64.sqrt() * 100.0;
        let got = realized_volatility(&closes, None).unwrap();
        assert!((got - expected).abs() < 1e-9);
    }
}
