//! Entropy-gated SMA crossover.
//!
//! Enters long when the fast SMA clears the slow SMA by the buffer and
//! realized entropy is below the entry threshold; flattens when the fast
//! SMA drops below the buffered slow SMA or entropy rises above the exit
//! threshold.

use crate::strategy::Strategy;
use living_core::{config::EntropyTrendParams, Bar, OrderIntent, PortfolioState, Result};
use living_features::{FeatureEngine, FeatureSnapshot, FeatureWindows};
use std::collections::BTreeMap;

/// SMA crossover with an entropy gate, one feature engine per symbol.
pub struct EntropyTrend {
    params: EntropyTrendParams,
    engines: BTreeMap<String, FeatureEngine>,
    last: Option<FeatureSnapshot>,
}

impl EntropyTrend {
    /// Create the strategy with no indicator history.
    pub fn new(params: EntropyTrendParams) -> Self {
        Self {
            params,
            engines: BTreeMap::new(),
            last: None,
        }
    }

    fn windows(&self) -> FeatureWindows {
        FeatureWindows {
            fast: self.params.lookback_fast,
            slow: self.params.lookback_slow,
            atr: self.params.atr_period,
            entropy: self.params.entropy_window,
        }
    }
}

impl Strategy for EntropyTrend {
    fn name(&self) -> &str {
        "entropy_trend"
    }

    fn on_start(&mut self) -> Result<()> {
        self.engines.clear();
        self.last = None;
        Ok(())
    }

    fn on_bar(&mut self, history: &[Bar], portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        let Some(bar) = history.last() else {
            return Ok(Vec::new());
        };
        let windows = self.windows();
        let engine = self
            .engines
            .entry(bar.symbol.clone())
            .or_insert_with(|| FeatureEngine::new(windows));
        engine.add_bar(bar);

        self.last = engine.snapshot();
        let Some(snap) = self.last else {
            return Ok(Vec::new());
        };

        let buffer = self.params.ma_buffer;
        let held = portfolio.position(&bar.symbol);

        if held.abs() <= living_core::QTY_EPSILON {
            if snap.fast_ma > snap.slow_ma * (1.0 + buffer)
                && snap.entropy < self.params.entropy_threshold
            {
                return Ok(vec![
                    OrderIntent::buy(bar.symbol.clone(), self.params.unit_size).with_tag("entry")
                ]);
            }
        } else if snap.fast_ma < snap.slow_ma * (1.0 - buffer)
            || snap.entropy > self.params.exit_threshold()
        {
            return Ok(vec![OrderIntent::flat(bar.symbol.clone()).with_tag("exit")]);
        }

        Ok(Vec::new())
    }

    fn notes(&self) -> BTreeMap<String, f64> {
        let mut notes = BTreeMap::new();
        if let Some(snap) = self.last {
            notes.insert("fast_ma".to_string(), snap.fast_ma);
            notes.insert("slow_ma".to_string(), snap.slow_ma);
            notes.insert("atr".to_string(), snap.atr);
            notes.insert("entropy".to_string(), snap.entropy);
        }
        notes
    }

    fn on_finish(&mut self, _portfolio: &PortfolioState) {
        self.last = None;
    }
}
