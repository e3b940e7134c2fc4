//! Command handler modules for pcg-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod allocate;
pub mod governance;
pub mod rebalance;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use pcg_config::{report_unused_keys, ConfigScope, LoadedConfig, UnusedKeyPolicy};
use pcg_schemas::Asset;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Layered config paths in merge order (repeatable). Omit for defaults.
    #[arg(long = "config")]
    pub config_paths: Vec<PathBuf>,

    /// Fail instead of warning when the config has keys this command ignores.
    #[arg(long, default_value_t = false)]
    pub strict_config: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UniverseArgs {
    /// Universe file (YAML or JSON list of ticker/name/score/volatility/sector).
    #[arg(long)]
    pub universe: PathBuf,

    /// Price history CSV (symbol,date,close[,high,low]).
    #[arg(long)]
    pub prices: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config and report keys the command will not read.
pub fn load_config(args: &ConfigArgs, scope: ConfigScope) -> Result<LoadedConfig> {
    let loaded = if args.config_paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        pcg_config::load_layered_yaml(args.config_paths.as_slice())?
    };

    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(scope, &loaded.config_json, policy)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(scope = scope.as_str(), pointer = %pointer, "config key not used by this command");
    }
    Ok(loaded)
}

/// Universe with prices attached when a CSV was given.
pub fn load_assets(args: &UniverseArgs) -> Result<Vec<Asset>> {
    let assets = pcg_md::load_universe(&args.universe)?;
    match &args.prices {
        None => Ok(assets),
        Some(p) => {
            let history = pcg_md::parse_prices_file(p)
                .with_context(|| format!("failed to load prices: {}", p.display()))?;
            Ok(pcg_md::attach_prices(assets, &history))
        }
    }
}

/// Parse `YYYY-MM-DD[,YYYY-MM-DD...]`.
pub fn parse_dates(raw: &str) -> Result<Vec<NaiveDate>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
        })
        .collect()
}

#[derive(Serialize)]
struct CommandOutput<'a, T: Serialize> {
    command: &'a str,
    config_hash: &'a str,
    result: &'a T,
}

/// Print `{command, config_hash, result}` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(command: &str, config: &LoadedConfig, result: &T) -> Result<()> {
    let out = CommandOutput {
        command,
        config_hash: &config.config_hash,
        result,
    };
    let json = serde_json::to_string_pretty(&out).context("serialize output json failed")?;
    println!("{json}");
    Ok(())
}
