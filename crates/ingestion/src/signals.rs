//! NinjaTrader 8 signal exports.
//!
//! Expects `Time`, `Signal` and `Price` columns. Signals are returned in
//! time order.

use crate::loader::parse_timestamp;
use living_core::{Error, ExternalSignal, Result, Side};
use std::io::Read;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 3] = ["Price", "Signal", "Time"];

/// Map an export's signal word to a side.
fn parse_side(raw: &str) -> Option<Side> {
    match raw.trim().to_lowercase().as_str() {
        "buy" | "long" | "enterlong" => Some(Side::Buy),
        "sell" | "short" | "entershort" => Some(Side::Sell),
        "flat" | "exit" | "close" | "exitlong" | "exitshort" => Some(Side::Flat),
        _ => None,
    }
}

/// Read NT8 signals from any CSV source.
pub fn read_nt8_signals<R: Read>(reader: R) -> Result<Vec<ExternalSignal>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let find = |col: &str| headers.iter().position(|h| h == col);

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| find(col).is_none())
        .collect();
    let (Some(time_idx), Some(signal_idx), Some(price_idx)) =
        (find("Time"), find("Signal"), find("Price"))
    else {
        return Err(Error::data(format!(
            "missing columns in NT8 export: {missing:?}"
        )));
    };

    let mut signals = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let raw_time = record.get(time_idx).unwrap_or("");
        let raw_signal = record.get(signal_idx).unwrap_or("");
        let raw_price = record.get(price_idx).unwrap_or("");

        let timestamp = parse_timestamp(raw_time).ok_or_else(|| {
            Error::data(format!("invalid Time '{raw_time}' on line {line}"))
        })?;
        let side = parse_side(raw_signal).ok_or_else(|| {
            Error::data(format!("unknown Signal '{raw_signal}' on line {line}"))
        })?;
        let price = raw_price.parse::<f64>().map_err(|_| {
            Error::data(format!("invalid Price '{raw_price}' on line {line}"))
        })?;

        signals.push(ExternalSignal {
            timestamp,
            side,
            price,
        });
    }

    signals.sort_by_key(|s| s.timestamp);
    tracing::debug!(count = signals.len(), "loaded NT8 signals");
    Ok(signals)
}

/// Load NT8 signals from a file.
pub fn load_nt8_signals(path: impl AsRef<Path>) -> Result<Vec<ExternalSignal>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_nt8_signals(file)
}
