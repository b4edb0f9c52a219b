//! Portfolio ledger for backtesting.
//!
//! Single owner of cash, positions and marks. Equity is always recomputed
//! from cash and positions at the last mark, never accumulated.

use living_core::{Bar, PortfolioState, Trade, QTY_EPSILON};
use std::collections::BTreeMap;

/// Tracks cash, positions, marks and realized P&L.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    state: PortfolioState,
    /// Last mark per symbol.
    marks: BTreeMap<String, f64>,
    /// Average entry price per open position.
    avg_cost: BTreeMap<String, f64>,
    /// Total fees paid.
    total_fees: f64,
    /// Trades applied.
    trade_count: usize,
}

impl PortfolioLedger {
    /// Create a ledger holding only cash.
    pub fn new(starting_cash: f64) -> Self {
        Self {
            state: PortfolioState::with_cash(starting_cash),
            marks: BTreeMap::new(),
            avg_cost: BTreeMap::new(),
            total_fees: 0.0,
            trade_count: 0,
        }
    }

    /// Apply an executed trade.
    ///
    /// Cash, position, average cost and realized P&L are computed first and
    /// assigned together.
    pub fn apply(&mut self, trade: &Trade) {
        let symbol = trade.symbol.as_str();
        let held = self.state.position(symbol);
        let delta = trade.signed_quantity();
        let next = held + delta;
        let avg = self.avg_cost.get(symbol).copied().unwrap_or(trade.fill_price);

        // Portion of the trade that closes existing exposure
        let closing = if held * delta < 0.0 {
            held.abs().min(delta.abs())
        } else {
            0.0
        };
        let price_diff = if held > 0.0 {
            trade.fill_price - avg
        } else {
            avg - trade.fill_price
        };
        let realized = closing * price_diff - trade.fees;

        let next_avg = if next.abs() <= QTY_EPSILON {
            None
        } else if held.abs() <= QTY_EPSILON || held * next < 0.0 {
            // Opened fresh or flipped through zero
            Some(trade.fill_price)
        } else if next.abs() > held.abs() {
            Some((held.abs() * avg + delta.abs() * trade.fill_price) / next.abs())
        } else {
            Some(avg)
        };

        self.state.cash += trade.cash_delta();
        self.state.realized_pnl += realized;
        self.total_fees += trade.fees;
        self.trade_count += 1;

        match next_avg {
            Some(cost) => {
                self.state.positions.insert(symbol.to_string(), next);
                self.avg_cost.insert(symbol.to_string(), cost);
            }
            None => {
                self.state.positions.remove(symbol);
                self.avg_cost.remove(symbol);
            }
        }

        self.marks
            .entry(symbol.to_string())
            .or_insert(trade.fill_price);
        self.recompute_equity();
    }

    /// Mark the bar's symbol at its close.
    pub fn mark(&mut self, bar: &Bar) {
        self.marks.insert(bar.symbol.clone(), bar.close);
        self.recompute_equity();
    }

    fn recompute_equity(&mut self) {
        self.state.mark_to_market_equity = self.equity();
    }

    /// cash + sum(position * last mark)
    pub fn equity(&self) -> f64 {
        self.state.cash
            + self
                .state
                .positions
                .iter()
                .map(|(symbol, qty)| qty * self.mark_price(symbol).unwrap_or(0.0))
                .sum::<f64>()
    }

    /// Last mark for `symbol`.
    pub fn mark_price(&self, symbol: &str) -> Option<f64> {
        self.marks
            .get(symbol)
            .or_else(|| self.avg_cost.get(symbol))
            .copied()
    }

    /// Unrealized P&L across open positions.
    pub fn unrealized_pnl(&self) -> f64 {
        self.state
            .positions
            .iter()
            .map(|(symbol, qty)| {
                let cost = self.avg_cost.get(symbol).copied().unwrap_or(0.0);
                let mark = self.mark_price(symbol).unwrap_or(cost);
                qty * (mark - cost)
            })
            .sum()
    }

    /// Average entry price of the open position in `symbol`.
    pub fn average_cost(&self, symbol: &str) -> Option<f64> {
        self.avg_cost.get(symbol).copied()
    }

    /// Current state.
    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    /// Total fees paid.
    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    /// Trades applied so far.
    pub fn trade_count(&self) -> usize {
        self.trade_count
    }
}
