//! Backtesting engine for the Living Engine.
//!
//! This crate provides:
//! - The strategy contract and built-in strategies
//! - Naive market-order fill modeling
//! - Portfolio ledger with mark-to-market equity
//! - Per-bar proof capsules with an optional hash chain
//! - Equity metrics and parallel parameter sweeps

pub mod capsule;
pub mod engine;
pub mod fill_model;
pub mod metrics;
pub mod portfolio;
pub mod strategies;
pub mod strategy;
pub mod sweep;

pub use capsule::{verify_chain, CapsuleRecorder, ChainVerification, CollapseEvidence};
pub use engine::{AbortReason, BacktestEngine, CancelToken, EngineState, RunArtifacts};
pub use fill_model::{FillEngine, IntentOutcome};
pub use metrics::{BacktestMetrics, MetricsCalculator};
pub use portfolio::PortfolioLedger;
pub use strategies::build_strategy;
pub use strategy::Strategy;
pub use sweep::{run_single, run_sweep, SweepCase, SweepRun};
