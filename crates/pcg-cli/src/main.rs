use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::governance::ConditionArgs;
use commands::{ConfigArgs, UniverseArgs};

#[derive(Parser)]
#[command(name = "pcg")]
#[command(about = "Portfolio construction & governance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> profile -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Allocate capital across a scored universe
    Allocate {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        universe: UniverseArgs,

        /// equal_weight | score_weighted | erc | volatility_target | hybrid
        #[arg(long, default_value = "hybrid")]
        method: String,

        /// Override /allocation/total_capital
        #[arg(long)]
        capital: Option<f64>,

        /// Check the allocation against /governance/base_rules
        #[arg(long, default_value_t = false)]
        check_limits: bool,
    },

    /// Allocate, then produce the full risk report (VaR/CVaR, stress, correlation)
    RiskReport {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        universe: UniverseArgs,

        #[arg(long, default_value = "hybrid")]
        method: String,

        #[arg(long)]
        capital: Option<f64>,
    },

    /// Dynamic limits for the given market conditions
    Limits {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        conditions: ConditionArgs,
    },

    /// Dynamic limits under the canonical market scenarios
    LimitsStress {
        #[command(flatten)]
        config: ConfigArgs,

        /// Use a named profile as the baseline instead of /governance/base_rules
        #[arg(long)]
        profile: Option<String>,
    },

    /// Apply dynamic limits to a named risk profile
    Profile {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        conditions: ConditionArgs,

        /// conservative | moderate | aggressive (unknown names use the default rules)
        #[arg(long)]
        name: String,
    },

    /// Compare conditions with the last history entry and raise alerts
    Monitor {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        conditions: ConditionArgs,

        /// Condition history JSONL (one snapshot per line)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Append the new snapshot to --history
        #[arg(long, default_value_t = false)]
        append: bool,
    },

    /// Chronological rebalancing over dated price history
    Rebalance {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        universe: UniverseArgs,

        #[arg(long, default_value = "hybrid")]
        method: String,

        /// Comma-separated rebalance dates (YYYY-MM-DD), strictly increasing
        #[arg(long)]
        dates: String,

        /// Write snapshots to this JSONL file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pcg_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Allocate {
            config,
            universe,
            method,
            capital,
            check_limits,
        } => commands::allocate::allocate(&config, &universe, &method, capital, check_limits)?,

        Commands::RiskReport {
            config,
            universe,
            method,
            capital,
        } => commands::allocate::risk_report(&config, &universe, &method, capital)?,

        Commands::Limits { config, conditions } => {
            commands::governance::limits(&config, &conditions)?
        }

        Commands::LimitsStress { config, profile } => {
            commands::governance::limits_stress(&config, profile.as_deref())?
        }

        Commands::Profile {
            config,
            conditions,
            name,
        } => commands::governance::profile(&config, &name, &conditions)?,

        Commands::Monitor {
            config,
            conditions,
            history,
            append,
        } => commands::governance::monitor(&config, &conditions, history.as_deref(), append)?,

        Commands::Rebalance {
            config,
            universe,
            method,
            dates,
            out,
        } => commands::rebalance::rebalance(&config, &universe, &method, &dates, out.as_deref())?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable JSON.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
