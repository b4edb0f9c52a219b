//! Fill engine for backtesting.
//!
//! Converts order intents into trades against the current bar using a
//! naive market-order policy: execution at the configured bar price,
//! optional participation clipping and a proportional fee.

use living_core::{
    config::EngineConfig, Annotation, AnnotationKind, Bar, Error, OrderIntent, OrderSize,
    PortfolioState, Result, Side, Trade, TradeSide, QTY_EPSILON,
};

/// What became of a single intent.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    /// Filled in full.
    Filled(Trade),
    /// Filled after the participation cap reduced the size.
    Clipped {
        /// The reduced fill.
        trade: Trade,
        /// Records requested vs filled size.
        annotation: Annotation,
    },
    /// No trade.
    Rejected(Annotation),
}

impl IntentOutcome {
    /// The executed trade, if any.
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            IntentOutcome::Filled(trade) | IntentOutcome::Clipped { trade, .. } => Some(trade),
            IntentOutcome::Rejected(_) => None,
        }
    }

    /// The ledger annotation, if any.
    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            IntentOutcome::Filled(_) => None,
            IntentOutcome::Clipped { annotation, .. } | IntentOutcome::Rejected(annotation) => {
                Some(annotation)
            }
        }
    }
}

/// Fill engine for simulating order execution.
pub struct FillEngine {
    config: EngineConfig,
}

impl FillEngine {
    /// Create a new fill engine.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Calculate the fee for a given notional.
    pub fn calculate_fee(&self, notional: f64) -> f64 {
        notional * self.config.fee_rate
    }

    /// Execute `intent` against `bar`.
    ///
    /// `portfolio` is the state before this intent. Malformed intents are a
    /// `StrategyFailure`; a sell that would go short while shorting is
    /// disabled is a `ConfigurationConflict`. Everything else that prevents
    /// a full fill comes back as an annotated outcome.
    pub fn fill(
        &self,
        intent: &OrderIntent,
        bar: &Bar,
        portfolio: &PortfolioState,
    ) -> Result<IntentOutcome> {
        self.validate(intent, bar)?;

        let price = bar.price(self.config.fill_price_field);
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::data(format!(
                "bar {} at {} has no usable fill price ({price})",
                bar.symbol, bar.timestamp
            )));
        }

        let held = portfolio.position(&intent.symbol);
        let (side, requested) = match intent.side {
            Side::Flat => {
                if held.abs() <= QTY_EPSILON {
                    return Ok(self.reject(intent, AnnotationKind::NothingToFlatten));
                }
                let side = if held > 0.0 {
                    TradeSide::Sell
                } else {
                    TradeSide::Buy
                };
                (side, held.abs())
            }
            Side::Buy => (
                TradeSide::Buy,
                self.units(intent.size, price, portfolio),
            ),
            Side::Sell => (
                TradeSide::Sell,
                self.units(intent.size, price, portfolio),
            ),
        };

        if requested <= QTY_EPSILON {
            return Ok(self.reject(intent, AnnotationKind::ZeroSize));
        }

        let mut quantity = requested;
        if let Some(rate) = self.config.max_participation_rate {
            let cap = rate * bar.volume.max(0.0);
            if cap <= QTY_EPSILON {
                return Ok(self.reject(intent, AnnotationKind::NoLiquidity));
            }
            quantity = quantity.min(cap);
        }

        if !self.config.allow_short && side == TradeSide::Sell {
            let after = held - quantity;
            if after < -QTY_EPSILON {
                return Err(Error::conflict(format!(
                    "selling {quantity} {} from a position of {held} would go short \
                     with allow_short disabled",
                    intent.symbol
                )));
            }
        }

        let fees = self.calculate_fee(quantity * price);
        if !self.config.allow_short && side == TradeSide::Buy {
            let required = quantity * price + fees;
            if required > portfolio.cash + QTY_EPSILON {
                return Ok(self.reject(
                    intent,
                    AnnotationKind::InsufficientFunds {
                        required,
                        available: portfolio.cash,
                    },
                ));
            }
        }

        let trade = Trade {
            timestamp: bar.timestamp,
            symbol: intent.symbol.clone(),
            side,
            quantity,
            fill_price: price,
            fees,
            tag: intent.tag.clone(),
        };

        if requested - quantity > QTY_EPSILON {
            let annotation = Annotation {
                symbol: intent.symbol.clone(),
                tag: intent.tag.clone(),
                kind: AnnotationKind::Clipped {
                    requested,
                    filled: quantity,
                },
            };
            return Ok(IntentOutcome::Clipped { trade, annotation });
        }
        Ok(IntentOutcome::Filled(trade))
    }

    fn validate(&self, intent: &OrderIntent, bar: &Bar) -> Result<()> {
        if intent.symbol.is_empty() {
            return Err(Error::strategy(bar.timestamp, "intent has an empty symbol"));
        }
        if intent.symbol != bar.symbol {
            return Err(Error::strategy(
                bar.timestamp,
                format!(
                    "intent for {} emitted on a {} bar",
                    intent.symbol, bar.symbol
                ),
            ));
        }
        if intent.side != Side::Flat && !intent.size.is_well_formed() {
            return Err(Error::strategy(
                bar.timestamp,
                format!("malformed order size {:?}", intent.size),
            ));
        }
        Ok(())
    }

    /// Units requested by a buy or sell.
    fn units(&self, size: OrderSize, price: f64, portfolio: &PortfolioState) -> f64 {
        match size {
            OrderSize::Units(units) => units,
            OrderSize::TargetWeight(weight) => {
                let equity = portfolio.mark_to_market_equity.max(0.0);
                weight * equity / price
            }
        }
    }

    fn reject(&self, intent: &OrderIntent, kind: AnnotationKind) -> IntentOutcome {
        IntentOutcome::Rejected(Annotation {
            symbol: intent.symbol.clone(),
            tag: intent.tag.clone(),
            kind,
        })
    }
}
