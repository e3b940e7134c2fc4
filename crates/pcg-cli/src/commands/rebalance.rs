//! `pcg rebalance` handler.

use anyhow::{Context, Result};
use pcg_allocation::{AllocationConfig, AllocationMethod};
use pcg_config::ConfigScope;
use pcg_rebalance::{JsonlSink, MemorySink, RebalanceConfig, Rebalancer, SnapshotSink};
use serde::Serialize;
use std::path::Path;

use super::{load_assets, load_config, parse_dates, print_json, ConfigArgs, UniverseArgs};

#[derive(Serialize)]
struct RebalanceSummary {
    snapshots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    /// Snapshots are included only when no output file was given.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    results: Vec<pcg_rebalance::RebalanceSnapshot>,
}

pub fn rebalance(
    config_args: &ConfigArgs,
    universe: &UniverseArgs,
    method: &str,
    dates: &str,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_args, ConfigScope::Rebalance)?;
    let method: AllocationMethod = method.parse()?;
    let allocation: AllocationConfig = config.section("/allocation")?;
    let rebalance_cfg: RebalanceConfig = config.section("/rebalance")?;
    let dates = parse_dates(dates)?;
    if dates.is_empty() {
        anyhow::bail!("--dates must list at least one rebalance date");
    }
    let assets = load_assets(universe)?;

    let rebalancer = Rebalancer::new(allocation, rebalance_cfg);
    let summary = match out {
        Some(path) => {
            let mut sink = JsonlSink::new(path)?;
            let snaps = run(&rebalancer, &assets, &dates, method, &mut sink)?;
            RebalanceSummary {
                snapshots: snaps.len(),
                output: Some(path.display().to_string()),
                results: Vec::new(),
            }
        }
        None => {
            let mut sink = MemorySink::new();
            let snaps = run(&rebalancer, &assets, &dates, method, &mut sink)?;
            RebalanceSummary {
                snapshots: snaps.len(),
                output: None,
                results: snaps,
            }
        }
    };
    print_json("rebalance", &config, &summary)
}

fn run(
    rebalancer: &Rebalancer,
    assets: &[pcg_schemas::Asset],
    dates: &[chrono::NaiveDate],
    method: AllocationMethod,
    sink: &mut dyn SnapshotSink,
) -> Result<Vec<pcg_rebalance::RebalanceSnapshot>> {
    rebalancer
        .run(assets, dates, method, sink)
        .context("rebalance failed")
}
