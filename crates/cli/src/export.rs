//! Artifact writers.
//!
//! Every writer renders into a string first; [`write_artifact`] puts it on
//! disk. The proof ledger CSV and the capsule JSON lines are both rendered
//! from the same capsule slice so they always agree on content and order.

use anyhow::{Context, Result};
use living_backtest::BacktestMetrics;
use living_core::{EquityPoint, ProofCapsule, Trade};
use std::path::{Path, PathBuf};

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade blotter.
///
/// Columns: timestamp, symbol, side, quantity, fill_price, fees, tag
pub fn export_blotter_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "symbol",
        "side",
        "quantity",
        "fill_price",
        "fees",
        "tag",
    ])?;

    for t in trades {
        let side = match t.side {
            living_core::TradeSide::Buy => "BUY",
            living_core::TradeSide::Sell => "SELL",
        };
        wtr.write_record([
            &t.timestamp.to_rfc3339(),
            &t.symbol,
            side,
            &format!("{}", t.quantity),
            &format!("{}", t.fill_price),
            &format!("{}", t.fees),
            &t.tag,
        ])?;
    }

    finish(wtr)
}

/// Proof ledger table, one row per capsule.
///
/// Nested fields (`annotations`, `notes`) are embedded as JSON so the
/// table carries the same information as the JSON lines.
pub fn export_proof_ledger_csv(capsules: &[ProofCapsule]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "seq",
        "timestamp",
        "symbol",
        "glyph",
        "regime",
        "entropy",
        "entropy_source",
        "collapse",
        "verdict",
        "cash",
        "equity",
        "fills",
        "annotations",
        "notes",
        "prev_digest",
        "digest",
    ])?;

    for c in capsules {
        let source = serde_json::to_value(c.entropy_source)?;
        wtr.write_record([
            &c.seq.to_string(),
            &c.timestamp.to_rfc3339(),
            &c.symbol,
            &c.glyph,
            &c.regime.map(|r| r.to_string()).unwrap_or_default(),
            &opt_f64(c.entropy_score),
            source.as_str().unwrap_or_default(),
            &c.collapse_flag.to_string(),
            c.verdict.as_str(),
            &format!("{}", c.cash),
            &format!("{}", c.equity),
            &c.fills.to_string(),
            &serde_json::to_string(&c.annotations)?,
            &serde_json::to_string(&c.notes)?,
            c.prev_digest.as_deref().unwrap_or(""),
            c.digest.as_deref().unwrap_or(""),
        ])?;
    }

    finish(wtr)
}

/// Equity curve.
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for point in curve {
        wtr.write_record([&point.timestamp.to_rfc3339(), &format!("{}", point.equity)])?;
    }
    finish(wtr)
}

// ─── JSON export ────────────────────────────────────────────────────

/// Proof capsules as JSON lines.
pub fn export_capsules_jsonl(capsules: &[ProofCapsule]) -> Result<String> {
    let mut out = String::new();
    for capsule in capsules {
        let line = serde_json::to_string(capsule).context("failed to serialize capsule")?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Headline metrics as pretty JSON.
pub fn export_metrics_json(metrics: &BacktestMetrics) -> Result<String> {
    serde_json::to_string_pretty(metrics).context("failed to serialize metrics to JSON")
}

// ─── Files ──────────────────────────────────────────────────────────

/// Write `contents` to `dir/name` and return the full path.
pub fn write_artifact(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
