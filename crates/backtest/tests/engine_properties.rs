//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. One capsule per consumed bar
//! 2. Replays of the same stream and config are identical
//! 3. Equity identity: equity == cash + sum(position * mark) after every bar
//! 4. Aborting after bar k leaves exactly k capsules and only their trades

use chrono::{Duration, TimeZone, Utc};
use living_backtest::{
    run_single, verify_chain, AbortReason, BacktestEngine, ChainVerification, EngineState,
    Strategy as TradingStrategy,
};
use living_core::config::{EmaGateParams, StrategyConfig};
use living_core::{
    AnnotationKind, Bar, BarStream, Config, Error, OrderIntent, PortfolioState, Result, TradeSide,
};
use proptest::prelude::*;

// ── Test strategies ─────────────────────────────────────────────────

/// Alternates buying and flattening on a fixed cadence.
struct Cadence {
    every: usize,
    units: f64,
}

impl TradingStrategy for Cadence {
    fn name(&self) -> &str {
        "cadence"
    }

    fn on_bar(&mut self, history: &[Bar], portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        let bar = &history[history.len() - 1];
        if history.len() % self.every != 0 {
            return Ok(Vec::new());
        }
        if portfolio.position(&bar.symbol) > 0.0 {
            Ok(vec![OrderIntent::flat(bar.symbol.clone()).with_tag("exit")])
        } else {
            Ok(vec![OrderIntent::buy(bar.symbol.clone(), self.units).with_tag("entry")])
        }
    }
}

/// Buys every bar and fails on bar `k + 1`.
struct FailAfter {
    k: usize,
}

impl TradingStrategy for FailAfter {
    fn name(&self) -> &str {
        "fail_after"
    }

    fn on_bar(&mut self, history: &[Bar], _portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        if history.len() > self.k {
            return Err(Error::Other("boom".into()));
        }
        let bar = &history[history.len() - 1];
        Ok(vec![OrderIntent::buy(bar.symbol.clone(), 1.0)])
    }
}

/// Emits one fixed intent on the first bar.
struct Once(OrderIntent);

impl TradingStrategy for Once {
    fn name(&self) -> &str {
        "once"
    }

    fn on_bar(&mut self, history: &[Bar], _portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
        if history.len() == 1 {
            Ok(vec![self.0.clone()])
        } else {
            Ok(Vec::new())
        }
    }
}

// ── Generators ──────────────────────────────────────────────────────

fn bars_from(closes: &[f64], entropy: Option<f64>) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Bar {
            symbol: "CL".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::hours(i as i64),
            open: *close,
            high: close + 1.0,
            low: close - 1.0,
            close: *close,
            volume: 500.0,
            entropy,
        })
        .collect()
}

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0),
        1..80,
    )
}

fn config() -> Config {
    let mut config = Config::default();
    config.engine.fee_rate = 0.0005;
    config.capsule.regime_boundaries = vec![0.01, 0.05];
    config.capsule.collapse_threshold = Some(0.05);
    config
}

fn run(closes: &[f64], every: usize) -> living_backtest::RunArtifacts {
    BacktestEngine::new(
        config(),
        Box::new(Cadence { every, units: 2.0 }),
        BarStream::new(bars_from(closes, None)),
    )
    .run()
}

// ── Properties ──────────────────────────────────────────────────────

proptest! {
    /// Every consumed bar produces exactly one capsule and one equity point.
    #[test]
    fn one_capsule_per_bar(closes in arb_closes(), every in 1usize..5) {
        let artifacts = run(&closes, every);
        prop_assert!(artifacts.is_complete());
        prop_assert_eq!(artifacts.capsules.len(), closes.len());
        prop_assert_eq!(artifacts.equity_curve.len(), closes.len());
        for (i, capsule) in artifacts.capsules.iter().enumerate() {
            prop_assert_eq!(capsule.seq, i as u64);
        }
    }

    /// Two replays of the same stream and config serialize identically.
    #[test]
    fn replays_are_identical(closes in arb_closes(), every in 1usize..5) {
        let a = run(&closes, every);
        let b = run(&closes, every);
        prop_assert_eq!(
            serde_json::to_string(&a.trades).unwrap(),
            serde_json::to_string(&b.trades).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_string(&a.capsules).unwrap(),
            serde_json::to_string(&b.capsules).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_string(&a.equity_curve).unwrap(),
            serde_json::to_string(&b.equity_curve).unwrap()
        );
    }

    /// Equity equals cash plus positions at the bar close after each bar.
    #[test]
    fn equity_identity(closes in arb_closes(), every in 1usize..4) {
        let bars = bars_from(&closes, None);
        let mut engine = BacktestEngine::new(
            config(),
            Box::new(Cadence { every, units: 1.5 }),
            BarStream::new(bars.clone()),
        );
        for bar in &bars {
            prop_assert!(engine.step().unwrap());
            let state = engine.portfolio();
            let expected = state.cash + state.position(&bar.symbol) * bar.close;
            prop_assert!((state.mark_to_market_equity - expected).abs() < 1e-6);
            prop_assert!(state.position(&bar.symbol) >= 0.0);
        }
    }

    /// Aborting after bar k leaves k capsules and only trades from bars 1..=k.
    #[test]
    fn abort_keeps_processed_prefix(closes in arb_closes(), k in 0usize..40) {
        let bars = bars_from(&closes, None);
        let artifacts = BacktestEngine::new(
            config(),
            Box::new(FailAfter { k }),
            BarStream::new(bars.clone()),
        )
        .run();

        let processed = k.min(bars.len());
        prop_assert_eq!(artifacts.capsules.len(), processed);
        prop_assert_eq!(artifacts.equity_curve.len(), processed);
        if k < bars.len() {
            prop_assert_eq!(artifacts.status, EngineState::Aborted);
            let cutoff = bars[k].timestamp;
            prop_assert!(artifacts.trades.iter().all(|t| t.timestamp < cutoff));
        } else {
            prop_assert!(artifacts.is_complete());
        }
    }

    /// The capsule hash chain always verifies for an untouched run.
    #[test]
    fn hash_chain_verifies(closes in arb_closes()) {
        let artifacts = run(&closes, 2);
        prop_assert_eq!(
            verify_chain(&artifacts.capsules).unwrap(),
            ChainVerification::Valid { capsules: closes.len() }
        );
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn test_three_bar_scenario() {
    struct Scenario;

    impl TradingStrategy for Scenario {
        fn name(&self) -> &str {
            "scenario"
        }

        fn on_bar(&mut self, history: &[Bar], _portfolio: &PortfolioState) -> Result<Vec<OrderIntent>> {
            Ok(match history.len() {
                1 => vec![OrderIntent::buy("CL", 1.0)],
                3 => vec![OrderIntent::flat("CL")],
                _ => Vec::new(),
            })
        }
    }

    let config = Config::default();
    let cash = config.engine.starting_cash;
    let artifacts = BacktestEngine::new(
        config,
        Box::new(Scenario),
        BarStream::new(bars_from(&[100.0, 105.0, 95.0], None)),
    )
    .run();

    assert_eq!(artifacts.trades.len(), 2);
    assert!((artifacts.trades[0].quantity - 1.0).abs() < 1e-10);
    assert!((artifacts.trades[0].fill_price - 100.0).abs() < 1e-10);
    assert!((artifacts.trades[1].quantity - 1.0).abs() < 1e-10);
    assert!((artifacts.trades[1].fill_price - 95.0).abs() < 1e-10);

    let equity: Vec<f64> = artifacts.equity_curve.iter().map(|p| p.equity).collect();
    assert!((equity[0] - cash).abs() < 1e-10);
    assert!((equity[1] - (cash - 100.0 + 105.0)).abs() < 1e-10);
    assert!((equity[2] - (cash - 100.0 + 95.0)).abs() < 1e-10);
    assert!(artifacts.final_portfolio.positions.is_empty());
}

#[test]
fn test_zero_size_intent_produces_no_trade() {
    let artifacts = BacktestEngine::new(
        Config::default(),
        Box::new(Once(OrderIntent::buy("CL", 0.0).with_tag("nothing"))),
        BarStream::new(bars_from(&[100.0, 101.0], None)),
    )
    .run();

    assert!(artifacts.is_complete());
    assert!(artifacts.trades.is_empty());
    let annotations = &artifacts.capsules[0].annotations;
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::ZeroSize);
    assert_eq!(annotations[0].tag, "nothing");
}

#[test]
fn test_short_disallowed() {
    let artifacts = BacktestEngine::new(
        Config::default(),
        Box::new(Once(OrderIntent::sell("CL", 1.0))),
        BarStream::new(bars_from(&[100.0, 101.0], None)),
    )
    .run();

    assert!(artifacts.trades.is_empty());
    assert!(artifacts.capsules.is_empty());
    assert!(artifacts.final_portfolio.positions.is_empty());
    assert!(matches!(
        artifacts.abort_reason,
        Some(AbortReason::ConfigurationConflict { .. })
    ));
}

#[test]
fn test_short_allowed() {
    let mut config = Config::default();
    config.engine.allow_short = true;
    let artifacts = BacktestEngine::new(
        config,
        Box::new(Once(OrderIntent::sell("CL", 1.0))),
        BarStream::new(bars_from(&[100.0, 90.0], None)),
    )
    .run();

    assert!(artifacts.is_complete());
    assert!((artifacts.final_portfolio.position("CL") + 1.0).abs() < 1e-10);
    let last = artifacts.equity_curve[1].equity;
    assert!((last - (artifacts.starting_cash + 10.0)).abs() < 1e-10);
}

#[test]
fn test_capsule_glyphs_follow_readings() {
    let mut config = Config::default();
    config.capsule.regime_boundaries = vec![0.3, 0.7];
    config.capsule.regime_labels = Some(vec!["P".into(), "EDGE".into(), "NP".into()]);
    config.capsule.collapse_threshold = Some(0.7);

    let mut bars = bars_from(&[100.0, 101.0, 102.0], None);
    bars[0].entropy = Some(0.1);
    bars[1].entropy = Some(0.5);
    bars[2].entropy = Some(0.9);

    let artifacts = BacktestEngine::new(
        config,
        Box::new(Cadence { every: 100, units: 1.0 }),
        BarStream::new(bars),
    )
    .run();

    let glyphs: Vec<&str> = artifacts.capsules.iter().map(|c| c.glyph.as_str()).collect();
    assert_eq!(glyphs, vec!["P", "EDGE", "NP"]);
    let collapses: Vec<bool> = artifacts.capsules.iter().map(|c| c.collapse_flag).collect();
    assert_eq!(collapses, vec![false, false, true]);
    assert_eq!(artifacts.collapse.hits, 1);
}

#[test]
fn test_default_ema_gate_trades_within_cash() {
    let params: EmaGateParams =
        serde_json::from_str(r#"{"p_threshold": 0.3, "np_threshold": 0.7}"#).unwrap();
    let mut config = Config::default();
    config.strategy = StrategyConfig::EmaEntropyGate(params);
    let cash = config.engine.starting_cash;

    let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
    let artifacts = run_single(&config, bars_from(&closes, Some(0.1)), None).unwrap();

    assert!(artifacts.is_complete());
    assert!(!artifacts.trades.is_empty());
    assert_eq!(artifacts.trades[0].side, TradeSide::Buy);
    assert!(artifacts.trades[0].quantity * artifacts.trades[0].fill_price <= cash);
    assert_eq!(artifacts.rejected_intents, 0);
    assert!(artifacts.equity_curve.iter().all(|p| p.equity > 0.0));
}
