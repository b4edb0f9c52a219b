//! EMA crossover gated by the bar's entropy reading.

use crate::strategy::Strategy;
use living_core::{config::EmaGateParams, Bar, OrderIntent, PortfolioState, Result, QTY_EPSILON};
use living_features::Ema;
use std::collections::BTreeMap;

/// Fast/slow EMA pair for one symbol.
struct EmaPair {
    fast: Ema,
    slow: Ema,
}

/// Buys when entropy is low and the fast EMA leads; flattens once entropy
/// reaches `np_threshold`. Bars without a reading count as zero entropy.
pub struct EmaEntropyGate {
    params: EmaGateParams,
    fee_rate: f64,
    pairs: BTreeMap<String, EmaPair>,
    last: Option<(f64, f64, f64)>,
}

impl EmaEntropyGate {
    /// Create the strategy; sizing assumes no fees until [`Self::with_fee_rate`].
    pub fn new(params: EmaGateParams) -> Self {
        Self {
            params,
            fee_rate: 0.0,
            pairs: BTreeMap::new(),
            last: None,
        }
    }

    /// Fee rate used to keep entries within available cash.
    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.fee_rate = fee_rate.max(0.0);
        self
    }

    /// Risk-based size capped at what cash can pay for, never below one unit.
    ///
    /// `max(1, min(floor(cash * risk_percent / (price * stop_distance_pct)),
    /// floor(cash / (price * (1 + fee_rate)))))`
    pub fn position_size(&self, cash: f64, price: f64) -> f64 {
        let cash = cash.max(0.0);
        let stop_distance = (price * self.params.stop_distance_pct).max(1e-9);
        let risk_size = (cash * self.params.risk_percent / stop_distance).floor();
        let unit_cost = (price * (1.0 + self.fee_rate)).max(1e-9);
        let affordable = (cash / unit_cost).floor();
        risk_size.min(affordable).max(1.0)
    }
}

impl Strategy for EmaEntropyGate {
    fn name(&self) -> &str {
        "ema_entropy_gate"
    }

    fn on_start(&mut self) -> Result<()> {
        self.pairs.clear();
        self.last = None;
        Ok(())
    }

    fn on_bar(&mut self, history: &[Bar], portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        let Some(bar) = history.last() else {
            return Ok(Vec::new());
        };
        let (fast_period, slow_period) = (self.params.ema_fast, self.params.ema_slow);
        let pair = self.pairs.entry(bar.symbol.clone()).or_insert_with(|| EmaPair {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
        });
        let fast = pair.fast.add(bar.close);
        let slow = pair.slow.add(bar.close);
        let entropy = bar.entropy.unwrap_or(0.0);
        self.last = Some((fast, slow, entropy));

        let held = portfolio.position(&bar.symbol);
        if held.abs() > QTY_EPSILON {
            if entropy >= self.params.np_threshold {
                return Ok(vec![OrderIntent::flat(bar.symbol.clone()).with_tag("np_exit")]);
            }
            return Ok(Vec::new());
        }

        if entropy < self.params.p_threshold && fast > slow {
            let size = self.position_size(portfolio.cash, bar.close);
            return Ok(vec![
                OrderIntent::buy(bar.symbol.clone(), size).with_tag("p_entry")
            ]);
        }
        Ok(Vec::new())
    }

    fn notes(&self) -> BTreeMap<String, f64> {
        let mut notes = BTreeMap::new();
        if let Some((fast, slow, entropy)) = self.last {
            notes.insert("ema_fast".to_string(), fast);
            notes.insert("ema_slow".to_string(), slow);
            notes.insert("entropy".to_string(), entropy);
        }
        notes
    }
}
