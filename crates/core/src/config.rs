//! Configuration structures for the Living Engine.
//!
//! The core consumes a `Config` value; reading it from YAML or JSON is the
//! job of the CLI.

use crate::error::{Error, Result};
use crate::types::PriceField;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fill and portfolio configuration.
    pub engine: EngineConfig,
    /// Proof capsule classification.
    pub capsule: CapsuleConfig,
    /// Strategy selection and parameters.
    pub strategy: StrategyConfig,
    /// Output file layout.
    pub output: OutputConfig,
}

impl Config {
    /// Reject value combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.capsule.validate()?;
        self.strategy.validate()
    }
}

/// Fill engine and portfolio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting cash balance.
    pub starting_cash: f64,
    /// Bar price market orders execute at.
    pub fill_price_field: PriceField,
    /// Maximum fraction of bar volume a single fill may take.
    pub max_participation_rate: Option<f64>,
    /// Fee as a fraction of notional.
    pub fee_rate: f64,
    /// Allow short positions and negative cash.
    pub allow_short: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_cash: 50_000.0,
            fill_price_field: PriceField::Close,
            max_participation_rate: None,
            fee_rate: 0.0,
            allow_short: false,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if !self.starting_cash.is_finite() || self.starting_cash <= 0.0 {
            return Err(Error::conflict(format!(
                "starting_cash must be positive, got {}",
                self.starting_cash
            )));
        }
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return Err(Error::conflict(format!(
                "fee_rate must be non-negative, got {}",
                self.fee_rate
            )));
        }
        if let Some(rate) = self.max_participation_rate {
            if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
                return Err(Error::conflict(format!(
                    "max_participation_rate must be in (0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Proof capsule classification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleConfig {
    /// Entropy at or above this value flags a collapse. None disables it.
    pub collapse_threshold: Option<f64>,
    /// Ascending entropy boundaries separating regimes.
    pub regime_boundaries: Vec<f64>,
    /// One label per regime (boundaries + 1). Defaults to R0, R1, ...
    pub regime_labels: Option<Vec<String>>,
    /// Closes used for realized entropy when bars carry no reading.
    pub entropy_window: usize,
    /// Chain capsule digests with SHA-256.
    pub hash_chain: bool,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            collapse_threshold: None,
            regime_boundaries: Vec::new(),
            regime_labels: None,
            entropy_window: 20,
            hash_chain: true,
        }
    }
}

impl CapsuleConfig {
    fn validate(&self) -> Result<()> {
        if self.regime_boundaries.iter().any(|b| !b.is_finite()) {
            return Err(Error::conflict("regime_boundaries must be finite"));
        }
        let ascending = self
            .regime_boundaries
            .windows(2)
            .all(|w| OrderedFloat(w[0]) < OrderedFloat(w[1]));
        if !ascending {
            return Err(Error::conflict(
                "regime_boundaries must be strictly ascending",
            ));
        }
        if let Some(labels) = &self.regime_labels {
            if labels.len() != self.regime_boundaries.len() + 1 {
                return Err(Error::conflict(format!(
                    "{} regime boundaries need {} labels, got {}",
                    self.regime_boundaries.len(),
                    self.regime_boundaries.len() + 1,
                    labels.len()
                )));
            }
        }
        if let Some(threshold) = self.collapse_threshold {
            if threshold.is_nan() {
                return Err(Error::conflict("collapse_threshold is NaN"));
            }
        }
        if self.entropy_window < 2 {
            return Err(Error::conflict("entropy_window must be at least 2"));
        }
        Ok(())
    }

    /// Label for regime `index`.
    pub fn label(&self, index: usize) -> String {
        self.regime_labels
            .as_ref()
            .and_then(|labels| labels.get(index).cloned())
            .unwrap_or_else(|| format!("R{index}"))
    }
}

/// Strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// SMA crossover gated by realized entropy.
    EntropyTrend(EntropyTrendParams),
    /// EMA crossover gated by the bar entropy reading.
    EmaEntropyGate(EmaGateParams),
    /// Replay externally generated signals.
    SignalReplay(SignalReplayParams),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::EntropyTrend(EntropyTrendParams::default())
    }
}

impl StrategyConfig {
    /// Short name used in logs and manifests.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::EntropyTrend(_) => "entropy_trend",
            StrategyConfig::EmaEntropyGate(_) => "ema_entropy_gate",
            StrategyConfig::SignalReplay(_) => "signal_replay",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            StrategyConfig::EntropyTrend(p) => {
                if p.lookback_fast == 0 || p.lookback_slow == 0 || p.atr_period == 0 {
                    return Err(Error::conflict("entropy_trend lookbacks must be positive"));
                }
                if p.entropy_window < 2 {
                    return Err(Error::conflict(
                        "entropy_trend entropy_window must be at least 2",
                    ));
                }
                if !(p.unit_size.is_finite() && p.unit_size > 0.0) {
                    return Err(Error::conflict("entropy_trend unit_size must be positive"));
                }
            }
            StrategyConfig::EmaEntropyGate(p) => {
                if p.ema_fast == 0 || p.ema_slow == 0 {
                    return Err(Error::conflict("ema_entropy_gate periods must be positive"));
                }
                if p.p_threshold > p.np_threshold {
                    return Err(Error::conflict(format!(
                        "p_threshold {} exceeds np_threshold {}",
                        p.p_threshold, p.np_threshold
                    )));
                }
                if !(p.stop_distance_pct.is_finite() && p.stop_distance_pct > 0.0) {
                    return Err(Error::conflict(
                        "ema_entropy_gate stop_distance_pct must be positive",
                    ));
                }
            }
            StrategyConfig::SignalReplay(p) => {
                if !(p.unit_size.is_finite() && p.unit_size > 0.0) {
                    return Err(Error::conflict("signal_replay unit_size must be positive"));
                }
            }
        }
        Ok(())
    }
}

/// Parameters for the entropy-gated SMA crossover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyTrendParams {
    /// Fast SMA lookback.
    pub lookback_fast: usize,
    /// Slow SMA lookback.
    pub lookback_slow: usize,
    /// ATR period.
    pub atr_period: usize,
    /// Closes used for realized entropy.
    pub entropy_window: usize,
    /// Enter only below this entropy.
    pub entropy_threshold: f64,
    /// Exit above this entropy (defaults to 1.5x the entry threshold).
    pub entropy_exit: Option<f64>,
    /// Crossover buffer as a fraction of the slow SMA.
    pub ma_buffer: f64,
    /// Units per entry.
    pub unit_size: f64,
}

impl Default for EntropyTrendParams {
    fn default() -> Self {
        Self {
            lookback_fast: 12,
            lookback_slow: 48,
            atr_period: 14,
            entropy_window: 20,
            entropy_threshold: 0.02,
            entropy_exit: None,
            ma_buffer: 0.0,
            unit_size: 1.0,
        }
    }
}

impl EntropyTrendParams {
    /// Effective exit threshold.
    pub fn exit_threshold(&self) -> f64 {
        self.entropy_exit.unwrap_or(self.entropy_threshold * 1.5)
    }
}

/// Parameters for the EMA crossover gated by entropy readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaGateParams {
    /// Fast EMA period.
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    /// Slow EMA period.
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    /// Enter only while entropy is below this.
    pub p_threshold: f64,
    /// Exit once entropy reaches this.
    pub np_threshold: f64,
    /// Fraction of cash put at risk per entry.
    #[serde(default = "default_risk_percent")]
    pub risk_percent: f64,
    /// Assumed stop distance as a fraction of price.
    #[serde(default = "default_stop_distance_pct")]
    pub stop_distance_pct: f64,
}

fn default_ema_fast() -> usize {
    12
}

fn default_ema_slow() -> usize {
    26
}

fn default_risk_percent() -> f64 {
    0.01
}

fn default_stop_distance_pct() -> f64 {
    0.005
}

/// Parameters for signal replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalReplayParams {
    /// Path to a NinjaTrader 8 signal export (may be overridden on the CLI).
    pub signals_file: Option<String>,
    /// Only trade this symbol (defaults to every bar's symbol).
    pub symbol: Option<String>,
    /// Units per entry.
    pub unit_size: f64,
}

impl Default for SignalReplayParams {
    fn default() -> Self {
        Self {
            signals_file: None,
            symbol: None,
            unit_size: 1.0,
        }
    }
}

/// Output file names, relative to the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Trade blotter (CSV).
    pub blotter_file: String,
    /// Proof ledger table (CSV).
    pub proof_ledger_file: String,
    /// Proof capsules (JSON lines).
    pub capsule_file: String,
    /// Equity curve (CSV).
    pub equity_file: String,
    /// Headline metrics (JSON).
    pub metrics_file: String,
    /// Run manifest (JSON).
    pub manifest_file: String,
    /// Narrative summary (text).
    pub summary_file: String,
    /// Write the proof ledger files.
    pub enable_proof_bridge: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            blotter_file: "trades.csv".to_string(),
            proof_ledger_file: "proof_ledger.csv".to_string(),
            capsule_file: "capsules.jsonl".to_string(),
            equity_file: "equity.csv".to_string(),
            metrics_file: "metrics.json".to_string(),
            manifest_file: "proof_capsule.json".to_string(),
            summary_file: "summary.txt".to_string(),
            enable_proof_bridge: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.starting_cash, 50_000.0);
        assert_eq!(config.engine.fill_price_field, PriceField::Close);
        assert!(!config.engine.allow_short);
        assert_eq!(config.strategy.name(), "entropy_trend");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unsorted_boundaries_conflict() {
        let mut config = Config::default();
        config.capsule.regime_boundaries = vec![0.5, 0.2];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict(_)));
    }

    #[test]
    fn test_label_count_mismatch() {
        let mut config = Config::default();
        config.capsule.regime_boundaries = vec![0.1, 0.3];
        config.capsule.regime_labels = Some(vec!["P".into(), "NP".into()]);
        assert!(config.validate().is_err());

        config.capsule.regime_labels = Some(vec!["P".into(), "MID".into(), "NP".into()]);
        assert!(config.validate().is_ok());
        assert_eq!(config.capsule.label(2), "NP");
    }

    #[test]
    fn test_default_labels() {
        let capsule = CapsuleConfig::default();
        assert_eq!(capsule.label(0), "R0");
        assert_eq!(capsule.label(3), "R3");
    }

    #[test]
    fn test_participation_rate_bounds() {
        let mut config = Config::default();
        config.engine.max_participation_rate = Some(1.5);
        assert!(config.validate().is_err());
        config.engine.max_participation_rate = Some(0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "engine": { "fee_rate": 0.001, "fill_price_field": "open" },
            "strategy": { "kind": "ema_entropy_gate", "p_threshold": 0.2, "np_threshold": 0.8 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine.fill_price_field, PriceField::Open);
        assert_eq!(config.engine.starting_cash, 50_000.0);
        match config.strategy {
            StrategyConfig::EmaEntropyGate(p) => {
                assert_eq!(p.ema_fast, 12);
                assert!((p.np_threshold - 0.8).abs() < 1e-10);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_entropy_exit_default() {
        let params = EntropyTrendParams::default();
        assert!((params.exit_threshold() - 0.03).abs() < 1e-10);
    }
}
