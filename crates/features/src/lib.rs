//! Feature computation for the Living Engine.
//!
//! This crate handles:
//! - Realized entropy (std-dev of close-to-close returns)
//! - Simple and exponential moving averages
//! - Average true range
//! - Per-series feature snapshots for strategies

pub mod entropy;
pub mod moving;
pub mod engine;

pub use entropy::RollingEntropy;
pub use moving::{Ema, RollingAtr, RollingMean};
pub use engine::{FeatureEngine, FeatureSnapshot, FeatureWindows};
