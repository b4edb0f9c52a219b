//! Realized entropy computation.
//!
//! Entropy here is the population standard deviation of simple
//! close-to-close returns over a rolling window of closes.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Rolling realized-entropy calculator.
pub struct RollingEntropy {
    /// Window size in closes.
    window: usize,
    /// Recent closes.
    closes: VecDeque<f64>,
}

impl RollingEntropy {
    /// Create a new calculator over `window` closes.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            closes: VecDeque::with_capacity(window.max(2)),
        }
    }

    /// Add a close.
    ///
    /// Returns the current entropy if enough data is available.
    pub fn add_close(&mut self, close: f64) -> Option<f64> {
        if self.closes.len() >= self.window {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
        self.value()
    }

    /// Simple returns between consecutive closes, skipping zero bases.
    fn returns(&self) -> Vec<f64> {
        self.closes
            .iter()
            .zip(self.closes.iter().skip(1))
            .filter(|(prev, _)| **prev != 0.0)
            .map(|(prev, curr)| (curr - prev) / prev)
            .collect()
    }

    /// Current entropy. Needs at least two returns.
    ///
    /// `None` while a non-finite close sits in the window.
    ///
    /// Recomputed from the window on every call so long runs do not
    /// accumulate running-sum error.
    pub fn value(&self) -> Option<f64> {
        let returns = self.returns();
        if returns.len() < 2 {
            return None;
        }
        let sd = returns.iter().population_std_dev();
        sd.is_finite().then_some(sd)
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.closes.len() >= self.window
    }

    /// Get the number of closes held.
    pub fn count(&self) -> usize {
        self.closes.len()
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.closes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready() {
        let mut ent = RollingEntropy::new(20);
        assert!(!ent.is_ready());
        assert!(ent.value().is_none());
        ent.add_close(100.0);
        ent.add_close(101.0);
        // One return only
        assert!(ent.value().is_none());
    }

    #[test]
    fn test_constant_price() {
        let mut ent = RollingEntropy::new(5);
        for _ in 0..10 {
            ent.add_close(100.0);
        }
        assert!((ent.value().unwrap() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_window() {
        let mut ent = RollingEntropy::new(3);
        for close in [100.0, 101.0, 102.0, 103.0, 104.0] {
            ent.add_close(close);
        }
        assert_eq!(ent.count(), 3);
        assert!(ent.is_ready());
    }

    #[test]
    fn test_known_entropy() {
        let mut ent = RollingEntropy::new(3);
        // Returns: +0.10, -0.10 -> mean 0, population sd 0.10
        ent.add_close(100.0);
        ent.add_close(110.0);
        let sd = ent.add_close(99.0).unwrap();
        approx::assert_relative_eq!(sd, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_base_skipped() {
        let mut ent = RollingEntropy::new(4);
        ent.add_close(0.0);
        ent.add_close(10.0);
        ent.add_close(11.0);
        // Only one usable return (10 -> 11)
        assert!(ent.value().is_none());
        ent.add_close(12.1);
        let sd = ent.value().unwrap();
        // Two equal +10% returns
        assert!(sd.abs() < 1e-12);
    }

    #[test]
    fn test_nan_close_yields_none_until_it_leaves() {
        let mut ent = RollingEntropy::new(3);
        ent.add_close(100.0);
        ent.add_close(101.0);
        assert!(ent.add_close(f64::NAN).is_none());
        assert!(ent.add_close(102.0).is_none());
        assert!(ent.add_close(103.0).is_none());
        // Window is now 102, 103, 104
        assert!(ent.add_close(104.0).is_some());
    }
}
