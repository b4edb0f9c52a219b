//! Living Engine CLI.
//!
//! Commands:
//! - `run`: backtest one config over a bar file and write its artifacts
//! - `sweep`: backtest several configs over the same bars in parallel

use anyhow::Result;
use clap::{Parser, Subcommand};
use living_cli::{run_backtest, run_sweep_configs, RunOptions, SweepOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "living")]
#[command(about = "Living Engine: entropy-gated backtests with proof capsules", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest.
    Run {
        /// YAML or JSON config file.
        #[arg(long)]
        config: PathBuf,

        /// Bar CSV file.
        #[arg(long)]
        data: PathBuf,

        /// Output directory.
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// NinjaTrader 8 signal export for signal_replay configs.
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Symbol for bar files without a symbol column. Defaults to the file stem.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Run several configs over the same bars.
    Sweep {
        /// Config files, one run each.
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// Bar CSV file.
        #[arg(long)]
        data: PathBuf,

        /// Output directory; each run writes to <out>/<config stem>/.
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// NinjaTrader 8 signal export for signal_replay configs.
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Symbol for bar files without a symbol column.
        #[arg(long)]
        symbol: Option<String>,

        /// Run cases one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            data,
            out,
            signals,
            symbol,
        } => {
            let report = run_backtest(&RunOptions {
                config,
                data,
                out,
                signals,
                symbol,
            })?;
            println!("{}", serde_json::to_string_pretty(&report.paths)?);
            if !report.complete {
                eprintln!(
                    "run aborted: {}",
                    report.abort_reason.as_deref().unwrap_or("unknown")
                );
                std::process::exit(2);
            }
        }
        Commands::Sweep {
            configs,
            data,
            out,
            signals,
            symbol,
            sequential,
        } => {
            let reports = run_sweep_configs(&SweepOptions {
                configs,
                data,
                out,
                signals,
                symbol,
                sequential,
            })?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
            if reports.iter().any(|r| !r.complete) {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
