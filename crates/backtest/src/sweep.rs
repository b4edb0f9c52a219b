//! Parallel parameter sweeps.
//!
//! Each run gets its own strategy, engine and ledger; nothing is shared
//! between runs except the read-only bars.

use crate::engine::{BacktestEngine, RunArtifacts};
use crate::metrics::{BacktestMetrics, MetricsCalculator};
use crate::strategies::build_strategy;
use living_core::{Bar, BarStream, Config, ExternalSignal, Result};
use rayon::prelude::*;

/// One named configuration in a sweep.
#[derive(Debug, Clone)]
pub struct SweepCase {
    /// Label used in reports and output directories.
    pub name: String,
    /// Run configuration.
    pub config: Config,
    /// Signals for `signal_replay` strategies.
    pub signals: Option<Vec<ExternalSignal>>,
}

/// Outcome of one sweep case.
#[derive(Debug, Clone)]
pub struct SweepRun {
    /// Case label.
    pub name: String,
    /// Run artifacts.
    pub artifacts: RunArtifacts,
    /// Metrics, absent when no bar was processed.
    pub metrics: Option<BacktestMetrics>,
}

/// Run a single configuration over `bars`.
pub fn run_single(
    config: &Config,
    bars: Vec<Bar>,
    signals: Option<Vec<ExternalSignal>>,
) -> Result<RunArtifacts> {
    let strategy = build_strategy(config, signals)?;
    Ok(BacktestEngine::new(config.clone(), strategy, BarStream::new(bars)).run())
}

/// Run every case over the same bars.
///
/// Results keep the order of `cases`. Runs execute on the rayon pool
/// unless `parallel` is false.
pub fn run_sweep(cases: &[SweepCase], bars: &[Bar], parallel: bool) -> Result<Vec<SweepRun>> {
    let execute = |case: &SweepCase| -> Result<SweepRun> {
        let artifacts = run_single(&case.config, bars.to_vec(), case.signals.clone())?;
        let metrics = MetricsCalculator::from_artifacts(&artifacts).ok();
        tracing::info!(
            case = %case.name,
            complete = artifacts.is_complete(),
            bars = artifacts.bars_processed(),
            "sweep case finished"
        );
        Ok(SweepRun {
            name: case.name.clone(),
            artifacts,
            metrics,
        })
    };

    if parallel {
        cases.par_iter().map(execute).collect()
    } else {
        cases.iter().map(execute).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use living_core::config::{EmaGateParams, StrategyConfig};

    fn bars() -> Vec<Bar> {
        (0..60)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.2;
                Bar {
                    symbol: "CL".into(),
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + Duration::days(i),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                    entropy: Some(((i % 10) as f64) / 10.0),
                }
            })
            .collect()
    }

    fn cases() -> Vec<SweepCase> {
        [0.2, 0.5, 0.9]
            .into_iter()
            .map(|p| {
                let mut config = Config::default();
                config.strategy = StrategyConfig::EmaEntropyGate(EmaGateParams {
                    ema_fast: 3,
                    ema_slow: 8,
                    p_threshold: p,
                    np_threshold: 0.95,
                    risk_percent: 0.001,
                    stop_distance_pct: 0.005,
                });
                SweepCase {
                    name: format!("p{p}"),
                    config,
                    signals: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let bars = bars();
        let parallel = run_sweep(&cases(), &bars, true).unwrap();
        let sequential = run_sweep(&cases(), &bars, false).unwrap();

        assert_eq!(parallel.len(), 3);
        for (p, s) in parallel.iter().zip(&sequential) {
            assert_eq!(p.name, s.name);
            assert_eq!(p.artifacts.trades, s.artifacts.trades);
            assert_eq!(p.artifacts.capsules, s.artifacts.capsules);
            assert_eq!(p.artifacts.equity_curve, s.artifacts.equity_curve);
        }
    }

    #[test]
    fn test_results_keep_case_order() {
        let runs = run_sweep(&cases(), &bars(), true).unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["p0.2", "p0.5", "p0.9"]);
        assert!(runs.iter().all(|r| r.artifacts.capsules.len() == 60));
        assert!(runs.iter().all(|r| r.metrics.is_some()));
    }
}
