//! Data ingestion and normalization for the Living Engine.
//!
//! This crate handles:
//! - OHLCV(+entropy) CSV loading with column aliasing
//! - Timestamp normalization to UTC
//! - Sorting and duplicate removal
//! - NinjaTrader 8 signal exports

pub mod loader;
pub mod signals;

pub use loader::{load_bars, parse_timestamp, BarLoader, LoadStats};
pub use signals::{load_nt8_signals, read_nt8_signals};
