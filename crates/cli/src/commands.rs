//! `run` and `sweep` commands.

use crate::config_file::load_config;
use crate::export::{
    export_blotter_csv, export_capsules_jsonl, export_equity_csv, export_metrics_json,
    export_proof_ledger_csv, write_artifact,
};
use crate::manifest::{file_sha256, RunManifest};
use crate::narrative::render_summary;
use anyhow::{bail, Context, Result};
use living_backtest::{
    run_single, run_sweep, BacktestMetrics, EngineState, MetricsCalculator, RunArtifacts,
    SweepCase,
};
use living_core::config::StrategyConfig;
use living_core::{Config, ExternalSignal};
use living_ingestion::{load_bars, load_nt8_signals};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Inputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub data: PathBuf,
    pub out: PathBuf,
    /// Overrides the config's `signals_file`.
    pub signals: Option<PathBuf>,
    /// Symbol for bar files without a symbol column (defaults to the file stem).
    pub symbol: Option<String>,
}

/// Inputs of a sweep.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub configs: Vec<PathBuf>,
    pub data: PathBuf,
    pub out: PathBuf,
    pub signals: Option<PathBuf>,
    pub symbol: Option<String>,
    /// Run cases one after another instead of on the rayon pool.
    pub sequential: bool,
}

/// What a run wrote, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub strategy: String,
    pub status: EngineState,
    pub complete: bool,
    pub abort_reason: Option<String>,
    pub verdict: String,
    pub metrics: Option<BacktestMetrics>,
    pub paths: BTreeMap<String, PathBuf>,
}

/// Execute one configuration over one bar file and write its artifacts.
pub fn run_backtest(opts: &RunOptions) -> Result<RunReport> {
    let config = load_config(&opts.config)?;
    let symbol = default_symbol(&opts.data, opts.symbol.as_deref());
    let bars = load_bars(&opts.data, &symbol)
        .with_context(|| format!("failed to load bars from {}", opts.data.display()))?;
    let signals = resolve_signals(&config, &opts.config, opts.signals.as_deref())?;
    let data_sha256 = file_sha256(&opts.data)?;

    info!(
        config = %opts.config.display(),
        data = %opts.data.display(),
        bars = bars.len(),
        "starting run"
    );
    let artifacts = run_single(&config, bars, signals)?;
    let name = stem(&opts.config);
    write_run(&name, &opts.out, &config, &artifacts, &opts.data, data_sha256)
}

/// Execute several configurations over the same bars.
///
/// Each case writes into `<out>/<config stem>/`; `<out>/sweep.json`
/// collects the per-case reports in input order.
pub fn run_sweep_configs(opts: &SweepOptions) -> Result<Vec<RunReport>> {
    if opts.configs.is_empty() {
        bail!("sweep needs at least one --config");
    }

    let mut seen = BTreeSet::new();
    let mut cases = Vec::with_capacity(opts.configs.len());
    for path in &opts.configs {
        let name = stem(path);
        if !seen.insert(name.clone()) {
            bail!("duplicate config name '{name}' in sweep");
        }
        let config = load_config(path)?;
        let signals = resolve_signals(&config, path, opts.signals.as_deref())?;
        cases.push(SweepCase {
            name,
            config,
            signals,
        });
    }

    let symbol = default_symbol(&opts.data, opts.symbol.as_deref());
    let bars = load_bars(&opts.data, &symbol)
        .with_context(|| format!("failed to load bars from {}", opts.data.display()))?;
    let data_sha256 = file_sha256(&opts.data)?;

    info!(cases = cases.len(), bars = bars.len(), "starting sweep");
    let runs = run_sweep(&cases, &bars, !opts.sequential)?;

    let mut reports = Vec::with_capacity(runs.len());
    for (run, case) in runs.iter().zip(&cases) {
        let dir = opts.out.join(&run.name);
        reports.push(write_run(
            &run.name,
            &dir,
            &case.config,
            &run.artifacts,
            &opts.data,
            data_sha256.clone(),
        )?);
    }

    let json = serde_json::to_string_pretty(&reports).context("failed to serialize sweep")?;
    write_artifact(&opts.out, "sweep.json", &json)?;
    Ok(reports)
}

/// Write every artifact of a run into `dir`.
fn write_run(
    name: &str,
    dir: &Path,
    config: &Config,
    artifacts: &RunArtifacts,
    data: &Path,
    data_sha256: String,
) -> Result<RunReport> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;

    let output = &config.output;
    let metrics = MetricsCalculator::from_artifacts(artifacts).ok();
    let manifest = RunManifest::new(config, artifacts, metrics.as_ref(), data, data_sha256);
    let mut paths = BTreeMap::new();

    paths.insert(
        "blotter".to_string(),
        write_artifact(dir, &output.blotter_file, &export_blotter_csv(&artifacts.trades)?)?,
    );
    paths.insert(
        "equity".to_string(),
        write_artifact(
            dir,
            &output.equity_file,
            &export_equity_csv(&artifacts.equity_curve)?,
        )?,
    );

    if output.enable_proof_bridge {
        let capsules = artifacts.capsules.as_slice();
        let ledger = export_proof_ledger_csv(capsules)?;
        let lines = export_capsules_jsonl(capsules)?;
        paths.insert(
            "proof_ledger".to_string(),
            write_artifact(dir, &output.proof_ledger_file, &ledger)?,
        );
        paths.insert(
            "capsules".to_string(),
            write_artifact(dir, &output.capsule_file, &lines)?,
        );
    }

    match &metrics {
        Some(m) => {
            paths.insert(
                "metrics".to_string(),
                write_artifact(dir, &output.metrics_file, &export_metrics_json(m)?)?,
            );
        }
        None => warn!(run = name, "no bar processed, skipping metrics"),
    }

    paths.insert(
        "manifest".to_string(),
        write_artifact(dir, &output.manifest_file, &manifest.to_json()?)?,
    );
    paths.insert(
        "summary".to_string(),
        write_artifact(
            dir,
            &output.summary_file,
            &render_summary(artifacts, metrics.as_ref(), &manifest.verdict),
        )?,
    );

    info!(
        run = name,
        dir = %dir.display(),
        capsules = artifacts.capsules.len(),
        trades = artifacts.trades.len(),
        "artifacts written"
    );

    Ok(RunReport {
        name: name.to_string(),
        strategy: artifacts.strategy.clone(),
        status: artifacts.status,
        complete: artifacts.is_complete(),
        abort_reason: artifacts.abort_reason.as_ref().map(|r| r.describe()),
        verdict: manifest.verdict,
        metrics,
        paths,
    })
}

/// Load external signals for `signal_replay` configs.
///
/// The command-line path wins over the config's `signals_file`; a relative
/// `signals_file` resolves against the config file's directory.
fn resolve_signals(
    config: &Config,
    config_path: &Path,
    cli_signals: Option<&Path>,
) -> Result<Option<Vec<ExternalSignal>>> {
    let StrategyConfig::SignalReplay(params) = &config.strategy else {
        if cli_signals.is_some() {
            warn!(
                strategy = config.strategy.name(),
                "--signals ignored for non-replay strategy"
            );
        }
        return Ok(None);
    };

    let path = match (cli_signals, &params.signals_file) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(file)) => config_path
            .parent()
            .map(|dir| dir.join(file))
            .unwrap_or_else(|| PathBuf::from(file)),
        (None, None) => return Ok(None),
    };
    let signals = load_nt8_signals(&path)
        .with_context(|| format!("failed to load signals from {}", path.display()))?;
    Ok(Some(signals))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("run")
        .to_string()
}

fn default_symbol(data: &Path, symbol: Option<&str>) -> String {
    symbol.map(str::to_string).unwrap_or_else(|| stem(data))
}
