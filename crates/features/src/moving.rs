//! Moving averages and average true range.

use std::collections::VecDeque;

/// Simple moving average over the most recent `window` values.
///
/// Before the window fills, the mean of whatever has been seen is reported.
pub struct RollingMean {
    window: usize,
    values: VecDeque<f64>,
}

impl RollingMean {
    /// Create a new rolling mean.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            values: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// Add a value and return the current mean.
    pub fn add(&mut self, value: f64) -> f64 {
        if self.values.len() >= self.window {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.value().unwrap_or(value)
    }

    /// Current mean, if any value has been seen.
    pub fn value(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.window
    }

    /// Get the number of values held.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Exponential moving average seeded with the first observation.
pub struct Ema {
    period: usize,
    value: Option<f64>,
}

impl Ema {
    /// Create a new EMA.
    pub fn new(period: usize) -> Self {
        Self {
            period,
            value: None,
        }
    }

    /// Smoothing factor 2 / (period + 1).
    fn alpha(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }

    /// Add a price and return the updated average.
    pub fn add(&mut self, price: f64) -> f64 {
        let next = match self.value {
            None => price,
            Some(_) if self.period <= 1 => price,
            Some(prev) => {
                let alpha = self.alpha();
                alpha * price + (1.0 - alpha) * prev
            }
        };
        self.value = Some(next);
        next
    }

    /// Current value.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.value = None;
    }
}

/// Average true range over the most recent `period` bars.
pub struct RollingAtr {
    ranges: RollingMean,
    prev_close: Option<f64>,
}

impl RollingAtr {
    /// Create a new ATR.
    pub fn new(period: usize) -> Self {
        Self {
            ranges: RollingMean::new(period),
            prev_close: None,
        }
    }

    /// Add a bar's high/low/close and return the current ATR.
    pub fn add(&mut self, high: f64, low: f64, close: f64) -> f64 {
        let hl = high - low;
        let tr = match self.prev_close {
            Some(pc) => hl.max((high - pc).abs()).max((low - pc).abs()),
            None => hl,
        };
        self.prev_close = Some(close);
        self.ranges.add(tr)
    }

    /// Current ATR.
    pub fn value(&self) -> Option<f64> {
        self.ranges.value()
    }

    /// Check if a full period of ranges has been seen.
    pub fn is_ready(&self) -> bool {
        self.ranges.is_ready()
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.prev_close = None;
    }
}
