//! Core data types for the Living Engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bar timestamp (UTC).
pub type Timestamp = DateTime<Utc>;

/// Quantities below this are treated as zero.
pub const QTY_EPSILON: f64 = 1e-10;

/// Which bar price market orders execute at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    /// Bar open.
    Open,
    /// Bar close.
    #[default]
    Close,
}

/// One OHLCV(+entropy) observation for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument symbol.
    pub symbol: String,
    /// Bar timestamp.
    pub timestamp: Timestamp,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Total volume.
    pub volume: f64,
    /// Entropy reading supplied with the data, if any.
    pub entropy: Option<f64>,
}

impl Bar {
    /// Price for the configured fill field.
    #[inline]
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::Close => self.close,
        }
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    #[inline]
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => hl.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => hl,
        }
    }
}

/// Ordered sequence of bars handed to the engine.
///
/// Loaders are expected to produce timestamp-sorted, deduplicated streams;
/// the engine still verifies ordering as it consumes them.
#[derive(Debug)]
pub struct BarStream {
    inner: std::vec::IntoIter<Bar>,
}

impl BarStream {
    /// Wrap an already ordered vector of bars.
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            inner: bars.into_iter(),
        }
    }

    /// Bars not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }

    /// Check if the stream is exhausted.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Iterator for BarStream {
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for BarStream {}

impl From<Vec<Bar>> for BarStream {
    fn from(bars: Vec<Bar>) -> Self {
        Self::new(bars)
    }
}

/// Direction requested by an order intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Increase the position.
    Buy,
    /// Decrease the position.
    Sell,
    /// Close whatever position is open.
    Flat,
}

/// How much an intent asks for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OrderSize {
    /// Absolute number of units.
    Units(f64),
    /// Fraction of current equity, converted to units at the fill price.
    TargetWeight(f64),
}

impl OrderSize {
    /// Raw magnitude as supplied by the strategy.
    pub fn value(self) -> f64 {
        match self {
            OrderSize::Units(v) | OrderSize::TargetWeight(v) => v,
        }
    }

    /// Negative or non-finite sizes are malformed.
    pub fn is_well_formed(self) -> bool {
        let v = self.value();
        v.is_finite() && v >= 0.0
    }
}

/// A strategy's request to trade, consumed immediately by the fill engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Instrument symbol.
    pub symbol: String,
    /// Requested direction.
    pub side: Side,
    /// Requested size (ignored for `Side::Flat`).
    pub size: OrderSize,
    /// Free-form strategy annotation.
    pub tag: String,
}

impl OrderIntent {
    /// Buy `units` of `symbol`.
    pub fn buy(symbol: impl Into<String>, units: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Buy,
            size: OrderSize::Units(units),
            tag: String::new(),
        }
    }

    /// Sell `units` of `symbol`.
    pub fn sell(symbol: impl Into<String>, units: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Sell,
            size: OrderSize::Units(units),
            tag: String::new(),
        }
    }

    /// Close the open position in `symbol`.
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Flat,
            size: OrderSize::Units(0.0),
            tag: String::new(),
        }
    }

    /// Attach a strategy tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Replace the size.
    pub fn with_size(mut self, size: OrderSize) -> Self {
        self.size = size;
        self
    }
}

/// Executed direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Get sign: +1 for buy, -1 for sell.
    pub fn sign(self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

/// An executed fill, appended to the trade blotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Timestamp of the bar the fill happened on.
    pub timestamp: Timestamp,
    /// Instrument symbol.
    pub symbol: String,
    /// Executed direction.
    pub side: TradeSide,
    /// Filled units (always positive).
    pub quantity: f64,
    /// Fill price.
    pub fill_price: f64,
    /// Fees charged.
    pub fees: f64,
    /// Tag of the originating intent.
    pub tag: String,
}

impl Trade {
    /// quantity * fill_price
    #[inline]
    pub fn notional(&self) -> f64 {
        self.quantity * self.fill_price
    }

    /// Position change caused by this trade.
    #[inline]
    pub fn signed_quantity(&self) -> f64 {
        self.quantity * self.side.sign()
    }

    /// Cash change caused by this trade, fees included.
    #[inline]
    pub fn cash_delta(&self) -> f64 {
        -self.signed_quantity() * self.fill_price - self.fees
    }
}

/// Read-only snapshot of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Cash balance.
    pub cash: f64,
    /// Open positions (symbol -> signed units).
    pub positions: BTreeMap<String, f64>,
    /// cash + sum(position * last mark).
    pub mark_to_market_equity: f64,
    /// Realized P&L since the start of the run, fees included.
    pub realized_pnl: f64,
}

impl PortfolioState {
    /// Fresh portfolio holding only cash.
    pub fn with_cash(cash: f64) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            mark_to_market_equity: cash,
            realized_pnl: 0.0,
        }
    }

    /// Signed units held in `symbol` (0 when flat).
    pub fn position(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Long/short/flat posture for `symbol`.
    pub fn posture(&self, symbol: &str) -> Posture {
        Posture::from_quantity(self.position(symbol))
    }
}

/// Position posture reported as a capsule verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Posture {
    Long,
    Short,
    Flat,
}

impl Posture {
    /// Classify a signed quantity.
    pub fn from_quantity(qty: f64) -> Self {
        if qty > QTY_EPSILON {
            Posture::Long
        } else if qty < -QTY_EPSILON {
            Posture::Short
        } else {
            Posture::Flat
        }
    }

    /// Upper-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Posture::Long => "LONG",
            Posture::Short => "SHORT",
            Posture::Flat => "FLAT",
        }
    }
}

/// Why an intent did not turn into a full trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Buy would have pushed cash below zero with margin disabled.
    InsufficientFunds { required: f64, available: f64 },
    /// Intent resolved to zero units.
    ZeroSize,
    /// Participation cap left nothing to fill (zero volume bar).
    NoLiquidity,
    /// Flat requested with no open position.
    NothingToFlatten,
    /// Fill reduced by the participation cap.
    Clipped { requested: f64, filled: f64 },
}

/// Attribution record for a rejected, skipped or clipped intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Intent symbol.
    pub symbol: String,
    /// Intent tag.
    pub tag: String,
    /// What happened.
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

/// Where a capsule's entropy score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropySource {
    /// The bar carried an entropy reading.
    Reading,
    /// Realized entropy of recent closes.
    Realized,
    /// Neither was available (warmup).
    Unavailable,
}

/// One audit record per processed bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofCapsule {
    /// Zero-based position in the ledger.
    pub seq: u64,
    /// Bar timestamp.
    pub timestamp: Timestamp,
    /// Bar symbol.
    pub symbol: String,
    /// Regime label.
    pub glyph: String,
    /// Regime index (None when unclassified).
    pub regime: Option<usize>,
    /// Entropy used for classification.
    pub entropy_score: Option<f64>,
    /// Origin of the entropy score.
    pub entropy_source: EntropySource,
    /// Entropy at or above the collapse threshold.
    pub collapse_flag: bool,
    /// Position posture for the bar's symbol after fills.
    pub verdict: Posture,
    /// Cash after fills.
    pub cash: f64,
    /// Mark-to-market equity after fills and mark.
    pub equity: f64,
    /// Trades filled on this bar.
    pub fills: usize,
    /// Rejected, skipped or clipped intents on this bar.
    pub annotations: Vec<Annotation>,
    /// Strategy diagnostics.
    pub notes: BTreeMap<String, f64>,
    /// Digest of the previous capsule (hash chain).
    pub prev_digest: Option<String>,
    /// Digest of this capsule (hash chain).
    pub digest: Option<String>,
}

/// Equity curve point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Timestamp,
    pub equity: f64,
}

/// A signal generated outside the engine (e.g. a NinjaTrader export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignal {
    /// When the signal fires.
    pub timestamp: Timestamp,
    /// Requested direction.
    pub side: Side,
    /// Reference price from the export.
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            symbol: "CL".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
            entropy: None,
        }
    }

    #[test]
    fn test_price_field() {
        let bar = sample_bar();
        assert_eq!(bar.price(PriceField::Open), 100.0);
        assert_eq!(bar.price(PriceField::Close), 105.0);
    }

    #[test]
    fn test_true_range_gap() {
        let bar = sample_bar();
        // high-low=20, |110-70|=40, |90-70|=20 -> 40
        assert!((bar.true_range(Some(70.0)) - 40.0).abs() < 1e-10);
        assert!((bar.true_range(None) - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_trade_cash_delta() {
        let trade = Trade {
            timestamp: sample_bar().timestamp,
            symbol: "CL".into(),
            side: TradeSide::Buy,
            quantity: 2.0,
            fill_price: 50.0,
            fees: 1.0,
            tag: String::new(),
        };
        assert!((trade.cash_delta() - (-101.0)).abs() < 1e-10);

        let sell = Trade {
            side: TradeSide::Sell,
            ..trade
        };
        assert!((sell.cash_delta() - 99.0).abs() < 1e-10);
    }

    #[test]
    fn test_order_size_well_formed() {
        assert!(OrderSize::Units(0.0).is_well_formed());
        assert!(OrderSize::TargetWeight(0.5).is_well_formed());
        assert!(!OrderSize::Units(-1.0).is_well_formed());
        assert!(!OrderSize::Units(f64::NAN).is_well_formed());
    }

    #[test]
    fn test_posture() {
        assert_eq!(Posture::from_quantity(1.0), Posture::Long);
        assert_eq!(Posture::from_quantity(-0.5), Posture::Short);
        assert_eq!(Posture::from_quantity(1e-12), Posture::Flat);
    }

    #[test]
    fn test_bar_stream_remaining() {
        let mut stream = BarStream::new(vec![sample_bar(), sample_bar()]);
        assert_eq!(stream.remaining(), 2);
        stream.next();
        assert_eq!(stream.remaining(), 1);
        assert!(!stream.is_empty());
    }

    #[test]
    fn test_annotation_serializes_flat() {
        let note = Annotation {
            symbol: "CL".into(),
            tag: "entry".into(),
            kind: AnnotationKind::InsufficientFunds {
                required: 120.0,
                available: 100.0,
            },
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("\"kind\":\"insufficient_funds\""));
        assert!(json.contains("\"required\":120.0"));
    }
}
