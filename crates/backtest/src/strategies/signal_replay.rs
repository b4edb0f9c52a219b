//! Replay of externally generated signals.

use crate::strategy::Strategy;
use living_core::{config::SignalReplayParams, Bar, ExternalSignal, OrderIntent, PortfolioState, Result, Side};
use std::collections::BTreeMap;

/// Emits one intent per signal whose timestamp matches the current bar.
///
/// Signals that fall between bars never match and are counted as missed.
pub struct SignalReplay {
    params: SignalReplayParams,
    signals: Vec<ExternalSignal>,
    cursor: usize,
    emitted: usize,
    missed: usize,
}

impl SignalReplay {
    /// `signals` must be sorted by timestamp.
    pub fn new(params: SignalReplayParams, signals: Vec<ExternalSignal>) -> Self {
        Self {
            params,
            signals,
            cursor: 0,
            emitted: 0,
            missed: 0,
        }
    }

    fn intent(&self, symbol: &str, signal: &ExternalSignal) -> OrderIntent {
        match signal.side {
            Side::Buy => OrderIntent::buy(symbol, self.params.unit_size).with_tag("replay_buy"),
            Side::Sell => OrderIntent::sell(symbol, self.params.unit_size).with_tag("replay_sell"),
            Side::Flat => OrderIntent::flat(symbol).with_tag("replay_flat"),
        }
    }
}

impl Strategy for SignalReplay {
    fn name(&self) -> &str {
        "signal_replay"
    }

    fn on_start(&mut self) -> Result<()> {
        self.cursor = 0;
        self.emitted = 0;
        self.missed = 0;
        Ok(())
    }

    fn on_bar(&mut self, history: &[Bar], _portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        let Some(bar) = history.last() else {
            return Ok(Vec::new());
        };
        if let Some(only) = &self.params.symbol {
            if *only != bar.symbol {
                return Ok(Vec::new());
            }
        }

        let mut intents = Vec::new();
        while let Some(signal) = self.signals.get(self.cursor) {
            if signal.timestamp > bar.timestamp {
                break;
            }
            if signal.timestamp == bar.timestamp {
                intents.push(self.intent(&bar.symbol, signal));
                self.emitted += 1;
            } else {
                tracing::warn!(at = %signal.timestamp, "signal does not match any bar");
                self.missed += 1;
            }
            self.cursor += 1;
        }
        Ok(intents)
    }

    fn notes(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("signals_emitted".to_string(), self.emitted as f64),
            ("signals_missed".to_string(), self.missed as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use living_core::Timestamp;

    fn ts(i: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap() + Duration::minutes(i)
    }

    fn make_bar(i: i64) -> Bar {
        Bar {
            symbol: "NQ".into(),
            timestamp: ts(i),
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 10.0,
            entropy: None,
        }
    }

    fn signal(minute: i64, side: Side) -> ExternalSignal {
        ExternalSignal {
            timestamp: ts(minute),
            side,
            price: 100.0,
        }
    }

    #[test]
    fn test_replays_matching_timestamps() {
        let signals = vec![signal(1, Side::Buy), signal(3, Side::Flat)];
        let mut strategy = SignalReplay::new(SignalReplayParams::default(), signals);
        let portfolio = PortfolioState::with_cash(1_000.0);

        let mut history = Vec::new();
        let mut sides = Vec::new();
        for i in 0..4 {
            history.push(make_bar(i));
            let intents = strategy.on_bar(&history, &portfolio).unwrap();
            sides.push(intents.first().map(|intent| intent.side));
        }
        assert_eq!(sides, vec![None, Some(Side::Buy), None, Some(Side::Flat)]);
        assert!((strategy.notes()["signals_emitted"] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_counts_missed_signals() {
        let mut off_grid = signal(1, Side::Buy);
        off_grid.timestamp += Duration::seconds(30);
        let mut strategy = SignalReplay::new(SignalReplayParams::default(), vec![off_grid]);
        let portfolio = PortfolioState::with_cash(1_000.0);

        let history: Vec<Bar> = (0..3).map(make_bar).collect();
        for end in 1..=3 {
            assert!(strategy.on_bar(&history[..end], &portfolio).unwrap().is_empty());
        }
        assert!((strategy.notes()["signals_missed"] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_symbol_filter() {
        let params = SignalReplayParams {
            symbol: Some("ES".into()),
            ..Default::default()
        };
        let mut strategy = SignalReplay::new(params, vec![signal(0, Side::Buy)]);
        let portfolio = PortfolioState::with_cash(1_000.0);
        assert!(strategy.on_bar(&[make_bar(0)], &portfolio).unwrap().is_empty());
    }
}
