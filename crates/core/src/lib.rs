//! Core types and configuration for the Living Engine backtester.
//!
//! This crate provides shared types used across all other crates:
//! - Market data types (bars, bar streams)
//! - Order intents, trades and portfolio snapshots
//! - Proof capsules and equity points
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
