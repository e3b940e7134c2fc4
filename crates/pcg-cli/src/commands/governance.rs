//! Governance command handlers.
//!
//! Covers `pcg limits`, `pcg limits-stress`, `pcg profile` and `pcg monitor`.
//! Condition history for `monitor` is a JSONL file of `ConditionSnapshot`
//! lines owned by the operator; the engine itself keeps nothing.

use anyhow::{Context, Result};
use clap::Args;
use pcg_config::{ConfigScope, LoadedConfig};
use pcg_governance::{
    ConditionSnapshot, GovernanceConfig, GovernanceEngine, MarketConditions, StressLevel,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::{load_config, print_json, ConfigArgs};

#[derive(Args, Debug, Clone)]
pub struct ConditionArgs {
    /// Annualised market volatility, percent.
    #[arg(long)]
    pub volatility: f64,

    /// Average pairwise correlation.
    #[arg(long)]
    pub correlation: f64,

    /// normal | elevated | high | crisis
    #[arg(long, default_value = "normal")]
    pub stress: String,
}

impl ConditionArgs {
    fn conditions(&self) -> Result<MarketConditions> {
        let stress: StressLevel = self.stress.parse()?;
        Ok(MarketConditions::new(self.volatility, self.correlation, stress)
            .with_timestamp(chrono::Utc::now()))
    }
}

fn engine(config: &LoadedConfig) -> Result<GovernanceEngine> {
    let cfg: GovernanceConfig = config.section("/governance")?;
    GovernanceEngine::new(cfg).context("invalid /governance config")
}

/// Execute `pcg limits`.
pub fn limits(config_args: &ConfigArgs, conditions: &ConditionArgs) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Governance)?;
    let limits = engine(&config)?.calculate_dynamic_limits(&conditions.conditions()?);
    print_json("limits", &config, &limits)
}

/// Execute `pcg limits-stress`.
pub fn limits_stress(config_args: &ConfigArgs, profile: Option<&str>) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Governance)?;
    let engine = engine(&config)?;
    let base = match profile {
        None => None,
        Some(name) => {
            let key = name.trim().to_ascii_lowercase();
            let rules = engine
                .config()
                .profiles
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase() == key)
                .map(|(_, r)| r.clone())
                .with_context(|| format!("unknown profile '{name}'"))?;
            Some(rules)
        }
    };
    let results = engine.stress_test_dynamic_limits(base.as_ref());
    print_json("limits-stress", &config, &results)
}

/// Execute `pcg profile`.
pub fn profile(config_args: &ConfigArgs, name: &str, conditions: &ConditionArgs) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Governance)?;
    let adjustment = engine(&config)?.adjust_risk_profile(name, &conditions.conditions()?);
    print_json("profile", &config, &adjustment)
}

/// Execute `pcg monitor`. With `append`, the new snapshot is written to the
/// history file after the report is produced.
pub fn monitor(
    config_args: &ConfigArgs,
    conditions: &ConditionArgs,
    history_path: Option<&Path>,
    append: bool,
) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Governance)?;
    let engine = engine(&config)?;

    let history = match history_path {
        Some(p) if p.exists() => read_history(p)?,
        _ => Vec::new(),
    };
    let report = engine.monitor_market_conditions(&conditions.conditions()?, &history);

    if append {
        let p = history_path.context("--append requires --history")?;
        append_snapshot(p, &report.snapshot)?;
    }
    print_json("monitor", &config, &report)
}

fn read_history(path: &Path) -> Result<Vec<ConditionSnapshot>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read history failed: {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l)
                .with_context(|| format!("invalid history line {}:{}", path.display(), i + 1))
        })
        .collect()
}

fn append_snapshot(path: &Path, snapshot: &ConditionSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }
    }
    let line = serde_json::to_string(snapshot).context("serialize snapshot failed")?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open history {}", path.display()))?;
    writeln!(f, "{line}").with_context(|| format!("append history {}", path.display()))?;
    Ok(())
}
