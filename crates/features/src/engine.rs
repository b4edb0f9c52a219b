//! Feature computation engine.
//!
//! Combines the rolling indicators into one per-series snapshot.

use crate::{
    entropy::RollingEntropy,
    moving::{RollingAtr, RollingMean},
};
use living_core::Bar;

/// Indicator windows for a feature engine.
#[derive(Debug, Clone, Copy)]
pub struct FeatureWindows {
    /// Fast SMA lookback.
    pub fast: usize,
    /// Slow SMA lookback.
    pub slow: usize,
    /// ATR period.
    pub atr: usize,
    /// Realized entropy window (closes).
    pub entropy: usize,
}

/// Indicator values after a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSnapshot {
    /// Fast SMA of closes.
    pub fast_ma: f64,
    /// Slow SMA of closes.
    pub slow_ma: f64,
    /// Average true range.
    pub atr: f64,
    /// Realized entropy (0 until two returns are available).
    pub entropy: f64,
}

/// Feature computation engine for a single bar series.
pub struct FeatureEngine {
    windows: FeatureWindows,
    fast: RollingMean,
    slow: RollingMean,
    atr: RollingAtr,
    entropy: RollingEntropy,
    /// Bars seen so far.
    bars_seen: usize,
}

impl FeatureEngine {
    /// Create a new feature engine.
    pub fn new(windows: FeatureWindows) -> Self {
        Self {
            windows,
            fast: RollingMean::new(windows.fast),
            slow: RollingMean::new(windows.slow),
            atr: RollingAtr::new(windows.atr),
            entropy: RollingEntropy::new(windows.entropy),
            bars_seen: 0,
        }
    }

    /// Process a bar.
    pub fn add_bar(&mut self, bar: &Bar) {
        self.fast.add(bar.close);
        self.slow.add(bar.close);
        self.atr.add(bar.high, bar.low, bar.close);
        self.entropy.add_close(bar.close);
        self.bars_seen += 1;
    }

    /// Check if the engine has enough warmup data.
    pub fn is_ready(&self) -> bool {
        self.bars_seen >= self.windows.slow && self.atr.is_ready()
    }

    /// Current indicator values, once warmed up.
    pub fn snapshot(&self) -> Option<FeatureSnapshot> {
        if !self.is_ready() {
            return None;
        }
        Some(FeatureSnapshot {
            fast_ma: self.fast.value()?,
            slow_ma: self.slow.value()?,
            atr: self.atr.value()?,
            entropy: self.entropy.value().unwrap_or(0.0),
        })
    }

    /// Bars processed so far.
    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.atr.clear();
        self.entropy.clear();
        self.bars_seen = 0;
    }
}
