//! Backtest performance metrics.
//!
//! Headline numbers computed from the equity curve, plus blotter counts.

use crate::engine::RunArtifacts;
use living_core::{EquityPoint, Error, Result, Trade, TradeSide};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Bars per year used for annualization.
pub const BARS_PER_YEAR: f64 = 252.0;

/// Backtest performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Equity before the first bar.
    pub start_equity: f64,
    /// Equity after the last bar.
    pub final_equity: f64,
    /// final / start - 1.
    pub total_return: f64,
    /// Annualized Sharpe of bar returns (sample std-dev, sqrt(252)).
    pub sharpe: f64,
    /// Maximum drawdown as a fraction of the running peak.
    pub max_drawdown: f64,
    /// CAGR estimate assuming 252 bars per year.
    pub cagr_est: f64,
    /// Bars processed.
    pub bars_processed: usize,
    /// Total number of trades.
    pub num_trades: usize,
    /// Buy trades.
    pub buy_trades: usize,
    /// Sell trades.
    pub sell_trades: usize,
    /// Total fees paid.
    pub total_fees: f64,
    /// Intents that produced no trade.
    pub rejected_intents: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator {
    start_equity: f64,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    pub fn new(start_equity: f64) -> Self {
        Self { start_equity }
    }

    /// Calculate metrics for a finished (or aborted) run.
    pub fn from_artifacts(artifacts: &RunArtifacts) -> Result<BacktestMetrics> {
        let mut metrics = Self::new(artifacts.starting_cash)
            .calculate(&artifacts.equity_curve, &artifacts.trades)?;
        metrics.rejected_intents = artifacts.rejected_intents;
        Ok(metrics)
    }

    /// Calculate metrics from an equity curve and blotter.
    ///
    /// Fails on an empty curve.
    pub fn calculate(&self, curve: &[EquityPoint], trades: &[Trade]) -> Result<BacktestMetrics> {
        if curve.is_empty() {
            return Err(Error::data("equity curve cannot be empty"));
        }

        let mut equity = Vec::with_capacity(curve.len() + 1);
        equity.push(self.start_equity);
        equity.extend(curve.iter().map(|p| p.equity));

        let starting = self.start_equity;
        let ending = equity[equity.len() - 1];
        let bars = curve.len();

        let buy_trades = trades.iter().filter(|t| t.side == TradeSide::Buy).count();

        Ok(BacktestMetrics {
            start_equity: starting,
            final_equity: ending,
            total_return: if starting != 0.0 {
                ending / starting - 1.0
            } else {
                0.0
            },
            sharpe: self.calculate_sharpe(&returns(&equity)),
            max_drawdown: max_drawdown(&equity),
            cagr_est: cagr(starting, ending, bars),
            bars_processed: bars,
            num_trades: trades.len(),
            buy_trades,
            sell_trades: trades.len() - buy_trades,
            total_fees: trades.iter().map(|t| t.fees).sum(),
            rejected_intents: 0,
        })
    }

    /// Annualized Sharpe ratio from bar returns.
    ///
    /// Zero dispersion with a non-zero mean is reported as +/- infinity.
    fn calculate_sharpe(&self, returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let mean = returns.iter().mean();
        let std_dev = if returns.len() > 1 {
            returns.iter().std_dev()
        } else {
            0.0
        };

        if std_dev > 0.0 && std_dev.is_finite() {
            (mean / std_dev) * BARS_PER_YEAR.sqrt()
        } else if mean != 0.0 {
            f64::INFINITY.copysign(mean)
        } else {
            0.0
        }
    }
}

/// Simple returns between consecutive equity values, skipping zero bases.
fn returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = equity.first().copied().unwrap_or(0.0);
    let mut max_dd = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        let dd = if peak > 0.0 { (peak - value) / peak } else { 0.0 };
        max_dd = max_dd.max(dd);
    }
    max_dd
}

fn cagr(starting: f64, ending: f64, bars: usize) -> f64 {
    if starting <= 0.0 {
        return 0.0;
    }
    if bars as f64 > BARS_PER_YEAR {
        (ending / starting).powf(BARS_PER_YEAR / bars as f64) - 1.0
    } else {
        ending / starting - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, equity)| EquityPoint {
                timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
                    + Duration::days(i as i64),
                equity: *equity,
            })
            .collect()
    }

    fn make_trade(side: TradeSide, fees: f64) -> Trade {
        Trade {
            timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            symbol: "CL".into(),
            side,
            quantity: 1.0,
            fill_price: 100.0,
            fees,
            tag: String::new(),
        }
    }

    #[test]
    fn test_basic_metrics() {
        let calculator = MetricsCalculator::new(100_000.0);
        let trades = vec![make_trade(TradeSide::Buy, 1.0), make_trade(TradeSide::Sell, 1.5)];
        let metrics = calculator
            .calculate(&curve(&[101_000.0, 99_000.0, 103_000.0]), &trades)
            .unwrap();

        assert!((metrics.final_equity - 103_000.0).abs() < 1e-10);
        // Peak 101_000 -> trough 99_000
        approx::assert_relative_eq!(metrics.max_drawdown, 2_000.0 / 101_000.0, epsilon = 1e-12);
        assert!(metrics.sharpe.is_finite());
        assert_eq!(metrics.bars_processed, 3);
        assert_eq!(metrics.buy_trades, 1);
        assert_eq!(metrics.sell_trades, 1);
        assert!((metrics.total_fees - 2.5).abs() < 1e-10);
        assert!((metrics.total_return - 0.03).abs() < 1e-10);
        // Short history: plain return
        assert!((metrics.cagr_est - 0.03).abs() < 1e-10);
    }

    #[test]
    fn test_empty_curve_is_error() {
        let calculator = MetricsCalculator::new(100_000.0);
        assert!(calculator.calculate(&[], &[]).is_err());
    }

    #[test]
    fn test_flat_equity() {
        let calculator = MetricsCalculator::new(1_000.0);
        let metrics = calculator.calculate(&curve(&[1_000.0; 5]), &[]).unwrap();
        assert_eq!(metrics.sharpe, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(metrics.num_trades, 0);
    }

    #[test]
    fn test_constant_growth_sharpe_is_infinite() {
        let calculator = MetricsCalculator::new(100.0);
        let metrics = calculator
            .calculate(&curve(&[110.0, 121.0, 133.1]), &[])
            .unwrap();
        // Identical returns up to rounding: either huge or infinite, never negative
        assert!(metrics.sharpe > 1e6);
    }

    #[test]
    fn test_cagr_annualizes_long_runs() {
        let values: Vec<f64> = (1..=504).map(|i| 100.0 + i as f64 * (100.0 / 504.0)).collect();
        let calculator = MetricsCalculator::new(100.0);
        let metrics = calculator.calculate(&curve(&values), &[]).unwrap();
        // Doubling over two years of bars
        approx::assert_relative_eq!(metrics.cagr_est, 2f64.sqrt() - 1.0, epsilon = 1e-9);
    }
}
