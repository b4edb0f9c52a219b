//! Strategy contract.
//!
//! A strategy sees the bar history up to and including the current bar and
//! a read-only portfolio snapshot, and answers with zero or more order
//! intents. For identical inputs it must produce identical intents: no
//! wall-clock reads and no unseeded randomness. Internal memory is allowed.

use living_core::{Bar, OrderIntent, PortfolioState, Result};
use std::collections::BTreeMap;

/// A pluggable trading strategy.
pub trait Strategy: Send {
    /// Short name used in logs and manifests.
    fn name(&self) -> &str;

    /// Called once before the first bar.
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Decide on the latest bar (`history.last()`).
    ///
    /// Any error aborts the run as a strategy failure at that bar.
    fn on_bar(&mut self, history: &[Bar], portfolio: &PortfolioState) -> Result<Vec<OrderIntent>>;

    /// Diagnostics for the current bar, recorded in its capsule.
    fn notes(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    /// Called once after the last bar of a completed run.
    fn on_finish(&mut self, _portfolio: &PortfolioState) {}
}
