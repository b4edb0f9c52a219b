//! Plain-text run summary.

use living_backtest::{BacktestMetrics, RunArtifacts};

/// Drawdown at or below which the run reads as confident.
pub const CONFIDENT_MAX_DRAWDOWN: f64 = 0.15;

/// Tone of the summary.
pub fn mood(max_drawdown: f64) -> &'static str {
    if max_drawdown <= CONFIDENT_MAX_DRAWDOWN {
        "confident"
    } else {
        "cautious"
    }
}

/// Render the run summary.
pub fn render_summary(
    artifacts: &RunArtifacts,
    metrics: Option<&BacktestMetrics>,
    verdict: &str,
) -> String {
    let mut lines = Vec::new();
    match metrics {
        Some(m) => {
            lines.push(format!(
                "Day Summary: the engine felt {} today.",
                mood(m.max_drawdown)
            ));
            lines.push(format!(
                "CAGR {:.2}% | Sharpe {:.2} | MaxDD {:.2}%",
                m.cagr_est * 100.0,
                m.sharpe,
                m.max_drawdown * 100.0
            ));
            lines.push(format!(
                "Equity {:.2} -> {:.2} over {} bars, {} trades, fees {:.2}",
                m.start_equity, m.final_equity, m.bars_processed, m.num_trades, m.total_fees
            ));
        }
        None => lines.push("Day Summary: no bar was processed.".to_string()),
    }
    lines.push(format!(
        "Capsules written: {}.",
        artifacts.capsules.len()
    ));
    lines.push(format!("Verdict: {verdict}"));
    if let Some(reason) = &artifacts.abort_reason {
        lines.push(format!("Run aborted: {}", reason.describe()));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
