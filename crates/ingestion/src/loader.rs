//! OHLCV bar loading from CSV.
//!
//! Normalizes column names, parses timestamps to UTC, sorts by time and
//! drops duplicate `(symbol, timestamp)` rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use living_core::{Bar, Error, Result, Timestamp};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Columns every input must provide (after aliasing).
const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Accepted naive timestamp layouts, tried in order.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Map a lower-cased header to its canonical name.
fn canonical_column(name: &str) -> &str {
    match name {
        "time" | "date" | "datetime" => "timestamp",
        "o" => "open",
        "h" => "high",
        "l" => "low",
        "c" => "close",
        "v" => "volume",
        other => other,
    }
}

/// Parse a timestamp in any of the accepted layouts.
///
/// Offsets are converted to UTC; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Statistics about a load.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    /// Data rows read.
    pub rows_read: u64,
    /// Rows dropped as duplicate `(symbol, timestamp)`.
    pub duplicates_dropped: u64,
    /// Rows carrying an entropy reading.
    pub rows_with_entropy: u64,
}

/// Column positions resolved from the header row.
struct ColumnIndex {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    symbol: Option<usize>,
    entropy: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| canonical_column(&h.trim().to_lowercase()).to_string())
            .collect();
        let find = |col: &str| names.iter().position(|n| n == col);

        let mut missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| find(col).is_none())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(Error::data(format!(
                "missing required columns: {missing:?}"
            )));
        }

        Ok(Self {
            timestamp: find("timestamp").unwrap_or_default(),
            open: find("open").unwrap_or_default(),
            high: find("high").unwrap_or_default(),
            low: find("low").unwrap_or_default(),
            close: find("close").unwrap_or_default(),
            volume: find("volume").unwrap_or_default(),
            symbol: find("symbol"),
            entropy: find("entropy"),
        })
    }
}

/// CSV bar loader.
pub struct BarLoader {
    /// Symbol used when the file has no symbol column (or it is blank).
    default_symbol: String,
    /// Load statistics.
    stats: LoadStats,
}

impl BarLoader {
    /// Create a new loader.
    pub fn new(default_symbol: impl Into<String>) -> Self {
        Self {
            default_symbol: default_symbol.into(),
            stats: LoadStats::default(),
        }
    }

    /// Statistics from the last read.
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Read bars from any CSV source.
    pub fn read<R: Read>(&mut self, reader: R) -> Result<Vec<Bar>> {
        self.stats = LoadStats::default();
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);
        let columns = ColumnIndex::from_headers(rdr.headers()?)?;

        let mut bars = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = row + 2;
            bars.push(self.parse_record(&record, &columns, line)?);
            self.stats.rows_read += 1;
        }

        // Stable: equal timestamps keep file order
        bars.sort_by_key(|b| b.timestamp);

        let mut seen = HashSet::with_capacity(bars.len());
        let before = bars.len();
        bars.retain(|b| seen.insert((b.symbol.clone(), b.timestamp)));
        self.stats.duplicates_dropped = (before - bars.len()) as u64;

        if self.stats.duplicates_dropped > 0 {
            tracing::warn!(
                dropped = self.stats.duplicates_dropped,
                "dropped duplicate (symbol, timestamp) rows"
            );
        }
        tracing::info!(
            rows = self.stats.rows_read,
            bars = bars.len(),
            with_entropy = self.stats.rows_with_entropy,
            "loaded bars"
        );

        Ok(bars)
    }

    fn parse_record(
        &mut self,
        record: &csv::StringRecord,
        columns: &ColumnIndex,
        line: usize,
    ) -> Result<Bar> {
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |idx: usize, name: &str| -> Result<f64> {
            field(idx)
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    Error::data(format!(
                        "invalid {name} '{}' on line {line}",
                        field(idx)
                    ))
                })
        };

        let raw_ts = field(columns.timestamp);
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| Error::data(format!("invalid timestamp '{raw_ts}' on line {line}")))?;

        let symbol = columns
            .symbol
            .map(field)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_symbol)
            .to_string();

        let entropy = match columns.entropy.map(field) {
            Some(raw) if !raw.is_empty() => {
                let value = raw.parse::<f64>().map_err(|_| {
                    Error::data(format!("invalid entropy '{raw}' on line {line}"))
                })?;
                self.stats.rows_with_entropy += 1;
                Some(value)
            }
            _ => None,
        };

        Ok(Bar {
            symbol,
            timestamp,
            open: number(columns.open, "open")?,
            high: number(columns.high, "high")?,
            low: number(columns.low, "low")?,
            close: number(columns.close, "close")?,
            volume: number(columns.volume, "volume")?,
            entropy,
        })
    }
}

/// Load bars from a CSV file.
pub fn load_bars(path: impl AsRef<Path>, default_symbol: &str) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(Error::data(format!(
            "unsupported file extension: {}",
            path.display()
        )));
    }
    let file = std::fs::File::open(path)?;
    BarLoader::new(default_symbol).read(file)
}
