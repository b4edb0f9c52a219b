//! Built-in strategies.

mod ema_gate;
mod entropy_trend;
mod signal_replay;

pub use ema_gate::EmaEntropyGate;
pub use entropy_trend::EntropyTrend;
pub use signal_replay::SignalReplay;

use crate::strategy::Strategy;
use living_core::{config::StrategyConfig, Config, Error, ExternalSignal, Result};

/// Build the strategy a configuration selects.
///
/// `signals` feeds `signal_replay`; the other strategies ignore it.
pub fn build_strategy(
    config: &Config,
    signals: Option<Vec<ExternalSignal>>,
) -> Result<Box<dyn Strategy>> {
    match &config.strategy {
        StrategyConfig::EntropyTrend(params) => Ok(Box::new(EntropyTrend::new(params.clone()))),
        StrategyConfig::EmaEntropyGate(params) => Ok(Box::new(
            EmaEntropyGate::new(params.clone()).with_fee_rate(config.engine.fee_rate),
        )),
        StrategyConfig::SignalReplay(params) => {
            let signals = signals.ok_or_else(|| {
                Error::config("signal_replay needs signals (set signals_file or pass --signals)")
            })?;
            Ok(Box::new(SignalReplay::new(params.clone(), signals)))
        }
    }
}
