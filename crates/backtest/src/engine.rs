//! Backtest engine.
//!
//! Replays a bar stream through a strategy, one bar at a time:
//! strategy, fills, apply, mark, capture, equity. Each bar is processed
//! against a staged copy of the ledger and committed only when every step
//! succeeded, so an aborted run exposes exactly the bars before the
//! failure.

use crate::capsule::{CapsuleRecorder, CollapseEvidence, StepContext};
use crate::fill_model::{FillEngine, IntentOutcome};
use crate::portfolio::PortfolioLedger;
use crate::strategy::Strategy;
use living_core::{
    Bar, BarStream, Config, EquityPoint, Error, PortfolioState, ProofCapsule, Result, Timestamp,
    Trade,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, no bar consumed.
    Idle,
    /// Consuming bars.
    Running,
    /// Stream exhausted.
    Completed,
    /// Stopped early; artifacts are partial.
    Aborted,
}

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The strategy failed or emitted a malformed intent.
    StrategyFailure {
        timestamp: Timestamp,
        message: String,
    },
    /// A bar did not follow its predecessor in time.
    InvalidBarOrdering {
        symbol: String,
        previous: Timestamp,
        current: Timestamp,
    },
    /// The configuration cannot be honoured.
    ConfigurationConflict { message: String },
    /// Cancelled through a [`CancelToken`].
    Cancelled,
    /// Any other failure.
    Other { message: String },
}

impl AbortReason {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::StrategyFailure { timestamp, message } => AbortReason::StrategyFailure {
                timestamp: *timestamp,
                message: message.clone(),
            },
            Error::InvalidBarOrdering {
                symbol,
                previous,
                current,
            } => AbortReason::InvalidBarOrdering {
                symbol: symbol.clone(),
                previous: *previous,
                current: *current,
            },
            Error::ConfigurationConflict(message) => AbortReason::ConfigurationConflict {
                message: message.clone(),
            },
            other => AbortReason::Other {
                message: other.to_string(),
            },
        }
    }

    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            AbortReason::StrategyFailure { timestamp, message } => {
                format!("strategy failure at {timestamp}: {message}")
            }
            AbortReason::InvalidBarOrdering {
                symbol,
                previous,
                current,
            } => format!("invalid bar ordering for {symbol}: {current} does not follow {previous}"),
            AbortReason::ConfigurationConflict { message } => {
                format!("configuration conflict: {message}")
            }
            AbortReason::Cancelled => "cancelled".to_string(),
            AbortReason::Other { message } => message.clone(),
        }
    }
}

/// Cooperative cancellation flag, checked before each bar.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// Strategy name.
    pub strategy: String,
    /// Final state (`Completed` or `Aborted`).
    pub status: EngineState,
    /// Set when the run aborted.
    pub abort_reason: Option<AbortReason>,
    /// Starting cash.
    pub starting_cash: f64,
    /// Trade blotter.
    pub trades: Vec<Trade>,
    /// One capsule per processed bar.
    pub capsules: Vec<ProofCapsule>,
    /// One point per processed bar.
    pub equity_curve: Vec<EquityPoint>,
    /// Portfolio after the last processed bar.
    pub final_portfolio: PortfolioState,
    /// Fees paid over the run.
    pub total_fees: f64,
    /// Intents that produced no trade.
    pub rejected_intents: usize,
    /// Fills reduced by the participation cap.
    pub clipped_fills: usize,
    /// Collapse evidence.
    pub collapse: CollapseEvidence,
}

impl RunArtifacts {
    /// False when the run aborted.
    pub fn is_complete(&self) -> bool {
        self.status == EngineState::Completed
    }

    /// Bars fully processed.
    pub fn bars_processed(&self) -> usize {
        self.capsules.len()
    }
}

/// Event-driven backtest engine. Owns all run state.
pub struct BacktestEngine {
    config: Config,
    strategy: Box<dyn Strategy>,
    stream: BarStream,
    fill_engine: FillEngine,
    ledger: PortfolioLedger,
    recorder: CapsuleRecorder,
    /// Bars processed so far (strategy history).
    history: Vec<Bar>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    /// Last accepted timestamp per symbol.
    last_seen: BTreeMap<String, Timestamp>,
    last_timestamp: Option<Timestamp>,
    state: EngineState,
    abort_reason: Option<AbortReason>,
    cancel: CancelToken,
    rejected_intents: usize,
    clipped_fills: usize,
}

impl BacktestEngine {
    /// Create an idle engine. The configuration is validated on the first step.
    pub fn new(config: Config, strategy: Box<dyn Strategy>, stream: BarStream) -> Self {
        let fill_engine = FillEngine::new(config.engine.clone());
        let ledger = PortfolioLedger::new(config.engine.starting_cash);
        let recorder = CapsuleRecorder::new(config.capsule.clone());
        let capacity = stream.remaining();

        Self {
            config,
            strategy,
            stream,
            fill_engine,
            ledger,
            recorder,
            history: Vec::with_capacity(capacity),
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(capacity),
            last_seen: BTreeMap::new(),
            last_timestamp: None,
            state: EngineState::Idle,
            abort_reason: None,
            cancel: CancelToken::new(),
            rejected_intents: 0,
            clipped_fills: 0,
        }
    }

    /// Share a cancellation token with the engine.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process the next bar.
    ///
    /// Returns `Ok(true)` when a bar was processed and `Ok(false)` once the
    /// run has completed or aborted. A fatal error aborts the run and is
    /// returned once; artifacts stay available.
    pub fn step(&mut self) -> Result<bool> {
        match self.state {
            EngineState::Completed | EngineState::Aborted => return Ok(false),
            EngineState::Idle => {
                if let Err(err) = self.start() {
                    self.abort(AbortReason::from_error(&err));
                    return Err(err);
                }
            }
            EngineState::Running => {}
        }

        if self.stream.is_empty() {
            self.finish();
            return Ok(false);
        }

        if self.cancel.is_cancelled() {
            self.abort(AbortReason::Cancelled);
            return Ok(false);
        }

        let Some(bar) = self.stream.next() else {
            self.finish();
            return Ok(false);
        };

        if let Err(err) = self.process_bar(bar) {
            self.abort(AbortReason::from_error(&err));
            return Err(err);
        }
        Ok(true)
    }

    /// Run to completion or abort.
    pub fn run(mut self) -> RunArtifacts {
        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) | Err(_) => break,
            }
        }
        self.into_artifacts()
    }

    fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        self.strategy.on_start()?;
        self.state = EngineState::Running;
        tracing::info!(
            strategy = self.strategy.name(),
            bars = self.stream.remaining(),
            starting_cash = self.config.engine.starting_cash,
            "starting backtest"
        );
        Ok(())
    }

    fn finish(&mut self) {
        self.strategy.on_finish(self.ledger.state());
        self.state = EngineState::Completed;
        tracing::info!(
            bars = self.history.len(),
            trades = self.trades.len(),
            equity = self.ledger.state().mark_to_market_equity,
            "backtest completed"
        );
    }

    fn abort(&mut self, reason: AbortReason) {
        tracing::error!(
            bars = self.history.len(),
            reason = %reason.describe(),
            "backtest aborted"
        );
        self.state = EngineState::Aborted;
        self.abort_reason = Some(reason);
    }

    fn check_ordering(&self, bar: &Bar) -> Result<()> {
        if let Some(previous) = self.last_seen.get(&bar.symbol) {
            if bar.timestamp <= *previous {
                return Err(Error::InvalidBarOrdering {
                    symbol: bar.symbol.clone(),
                    previous: *previous,
                    current: bar.timestamp,
                });
            }
        }
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp < previous {
                return Err(Error::InvalidBarOrdering {
                    symbol: bar.symbol.clone(),
                    previous,
                    current: bar.timestamp,
                });
            }
        }
        Ok(())
    }

    fn check_prices(bar: &Bar) -> Result<()> {
        let fields = [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
            ("volume", bar.volume),
        ];
        match fields.iter().find(|(_, value)| !value.is_finite()) {
            Some((name, value)) => Err(Error::data(format!(
                "non-finite {name} {value} on {} bar at {}",
                bar.symbol, bar.timestamp
            ))),
            None => Ok(()),
        }
    }

    fn process_bar(&mut self, bar: Bar) -> Result<()> {
        self.check_ordering(&bar)?;
        Self::check_prices(&bar)?;
        self.history.push(bar.clone());
        let result = self.evaluate(&bar);
        if result.is_err() {
            self.history.pop();
        }
        result
    }

    fn evaluate(&mut self, bar: &Bar) -> Result<()> {
        let intents = self
            .strategy
            .on_bar(&self.history, self.ledger.state())
            .map_err(|err| match err {
                err @ Error::StrategyFailure { .. } => err,
                other => Error::strategy(bar.timestamp, other.to_string()),
            })?;

        let mut staged = self.ledger.clone();
        let mut fills = Vec::new();
        let mut annotations = Vec::new();
        let mut rejected = 0;
        let mut clipped = 0;

        for intent in &intents {
            let outcome = self.fill_engine.fill(intent, bar, staged.state())?;
            match &outcome {
                IntentOutcome::Rejected(_) => rejected += 1,
                IntentOutcome::Clipped { .. } => clipped += 1,
                IntentOutcome::Filled(_) => {}
            }
            if let Some(trade) = outcome.trade() {
                staged.apply(trade);
                tracing::debug!(
                    ts = %trade.timestamp,
                    symbol = %trade.symbol,
                    side = ?trade.side,
                    qty = trade.quantity,
                    price = trade.fill_price,
                    "fill"
                );
                fills.push(trade.clone());
            }
            if let Some(annotation) = outcome.annotation() {
                tracing::warn!(
                    ts = %bar.timestamp,
                    symbol = %annotation.symbol,
                    tag = %annotation.tag,
                    kind = ?annotation.kind,
                    "intent not fully filled"
                );
                annotations.push(annotation.clone());
            }
        }

        staged.mark(bar);
        let step = StepContext {
            fills: fills.len(),
            annotations,
            notes: self.strategy.notes(),
        };
        self.recorder.capture(bar, staged.state(), step)?;

        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: staged.state().mark_to_market_equity,
        });
        self.ledger = staged;
        self.trades.extend(fills);
        self.rejected_intents += rejected;
        self.clipped_fills += clipped;
        self.last_seen.insert(bar.symbol.clone(), bar.timestamp);
        self.last_timestamp = Some(bar.timestamp);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Why the run aborted, if it did.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    /// Current portfolio.
    pub fn portfolio(&self) -> &PortfolioState {
        self.ledger.state()
    }

    /// Trades so far.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Capsules so far.
    pub fn capsules(&self) -> &[ProofCapsule] {
        self.recorder.capsules()
    }

    /// Equity curve so far.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Bars fully processed.
    pub fn bars_processed(&self) -> usize {
        self.recorder.len()
    }

    /// Freeze the run into its artifacts.
    pub fn into_artifacts(self) -> RunArtifacts {
        let collapse = self.recorder.evidence();
        RunArtifacts {
            strategy: self.strategy.name().to_string(),
            status: self.state,
            abort_reason: self.abort_reason,
            starting_cash: self.config.engine.starting_cash,
            trades: self.trades,
            final_portfolio: self.ledger.state().clone(),
            total_fees: self.ledger.total_fees(),
            capsules: self.recorder.into_capsules(),
            equity_curve: self.equity_curve,
            rejected_intents: self.rejected_intents,
            clipped_fills: self.clipped_fills,
            collapse,
        }
    }
}
