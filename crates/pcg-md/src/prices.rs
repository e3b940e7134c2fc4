//! Price history CSV parsing.
//!
//! ## Column contract (case-sensitive header, order-independent)
//!
//! | Column   | Example      | Notes                                   |
//! |----------|--------------|-----------------------------------------|
//! | `symbol` | `AAPL`       | required                                |
//! | `date`   | `2024-03-01` | optional; empty ⇒ undated point         |
//! | `close`  | `184.50`     | required                                |
//! | `high`   | `185.00`     | optional                                |
//! | `low`    | `181.00`     | optional                                |
//!
//! Dated rows are sorted per symbol; undated rows keep file order.
//! Values are not validated here beyond parsing; the engines re-validate.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use pcg_schemas::PricePoint;
use serde::Deserialize;

/// symbol → ordered price series.
pub type PriceHistory = BTreeMap<String, Vec<PricePoint>>;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CsvLoadError {
    /// I/O or CSV-library error.
    Io(String),
    /// The header row is missing a required column.
    MissingHeader(String),
    /// A field could not be parsed into the expected type.
    ParseField {
        row: usize,
        field: &'static str,
        raw: String,
    },
    /// The same symbol/date pair appears twice.
    DuplicateDate {
        row: usize,
        symbol: String,
        date: NaiveDate,
    },
}

impl fmt::Display for CsvLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvLoadError::Io(msg) => write!(f, "csv io error: {msg}"),
            CsvLoadError::MissingHeader(col) => {
                write!(f, "csv missing required header column: '{col}'")
            }
            CsvLoadError::ParseField { row, field, raw } => {
                write!(f, "csv row {row}: cannot parse field '{field}' from value '{raw}'")
            }
            CsvLoadError::DuplicateDate { row, symbol, date } => {
                write!(f, "csv row {row}: duplicate date {date} for '{symbol}'")
            }
        }
    }
}

impl std::error::Error for CsvLoadError {}

// ---------------------------------------------------------------------------
// Raw row
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PriceRow {
    symbol: String,
    #[serde(default)]
    date: Option<String>,
    close: String,
    #[serde(default)]
    high: Option<String>,
    #[serde(default)]
    low: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn parse_prices_file(path: &Path) -> Result<PriceHistory, CsvLoadError> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| CsvLoadError::Io(format!("read '{}': {e}", path.display())))?;
    parse_prices_str(&src)
}

/// Parse price CSV text. See the module docs for the column contract.
pub fn parse_prices_str(src: &str) -> Result<PriceHistory, CsvLoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(src.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| CsvLoadError::Io(e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Ok(PriceHistory::new());
    }
    for required in ["symbol", "close"] {
        if !headers.iter().any(|h| h == required) {
            return Err(CsvLoadError::MissingHeader(required.to_string()));
        }
    }

    let mut out = PriceHistory::new();
    let mut seen: BTreeSet<(String, NaiveDate)> = BTreeSet::new();

    for (i, rec) in rdr.deserialize::<PriceRow>().enumerate() {
        // 1-based data rows; header is row 1.
        let row_num = i + 2;
        let row = rec.map_err(|e| CsvLoadError::Io(format!("row {row_num}: {e}")))?;

        let date = match row.date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
                CsvLoadError::ParseField {
                    row: row_num,
                    field: "date",
                    raw: raw.to_string(),
                }
            })?),
        };

        if let Some(d) = date {
            if !seen.insert((row.symbol.clone(), d)) {
                return Err(CsvLoadError::DuplicateDate {
                    row: row_num,
                    symbol: row.symbol,
                    date: d,
                });
            }
        }

        let close = parse_f64(row_num, "close", &row.close)?;
        let high = parse_opt_f64(row_num, "high", row.high.as_deref())?;
        let low = parse_opt_f64(row_num, "low", row.low.as_deref())?;

        out.entry(row.symbol).or_default().push(PricePoint {
            date,
            close,
            high,
            low,
        });
    }

    for series in out.values_mut() {
        if series.iter().all(|p| p.date.is_some()) {
            series.sort_by_key(|p| p.date);
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_f64(row: usize, field: &'static str, raw: &str) -> Result<f64, CsvLoadError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CsvLoadError::ParseField {
            row,
            field,
            raw: raw.to_string(),
        })
}

fn parse_opt_f64(
    row: usize,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, CsvLoadError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_f64(row, field, s).map(Some),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_sorts_dated_rows() {
        let src = "symbol,date,close\n\
                   AAA,2024-01-03,12\n\
                   BBB,2024-01-02,50\n\
                   AAA,2024-01-02,11\n";
        let h = parse_prices_str(src).unwrap();
        assert_eq!(h.len(), 2);
        let a = &h["AAA"];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].close, 11.0);
        assert_eq!(a[1].close, 12.0);
    }

    #[test]
    fn optional_high_low_columns() {
        let src = "symbol,date,close,high,low\nAAA,2024-01-02,11,12,10\nAAA,2024-01-03,12,,\n";
        let h = parse_prices_str(src).unwrap();
        assert_eq!(h["AAA"][0].high, Some(12.0));
        assert_eq!(h["AAA"][1].low, None);
    }

    #[test]
    fn undated_rows_keep_file_order() {
        let src = "symbol,close\nAAA,3\nAAA,1\nAAA,2\n";
        let h = parse_prices_str(src).unwrap();
        let closes: Vec<f64> = h["AAA"].iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![3.0, 1.0, 2.0]);
        assert!(h["AAA"].iter().all(|p| p.date.is_none()));
    }

    #[test]
    fn missing_close_header_is_rejected() {
        let err = parse_prices_str("symbol,date\nAAA,2024-01-01\n").unwrap_err();
        assert!(matches!(err, CsvLoadError::MissingHeader(ref c) if c == "close"));
    }

    #[test]
    fn bad_date_reports_row() {
        let err = parse_prices_str("symbol,date,close\nAAA,01/02/2024,1\n").unwrap_err();
        match err {
            CsvLoadError::ParseField { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "date");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn duplicate_date_is_rejected() {
        let src = "symbol,date,close\nAAA,2024-01-02,1\nAAA,2024-01-02,2\n";
        assert!(matches!(
            parse_prices_str(src).unwrap_err(),
            CsvLoadError::DuplicateDate { row: 3, .. }
        ));
    }

    #[test]
    fn unparseable_close_is_rejected() {
        let err = parse_prices_str("symbol,close\nAAA,abc\n").unwrap_err();
        assert!(matches!(err, CsvLoadError::ParseField { field: "close", .. }));
    }
}
