//! Command-line front end for the Living Engine.
//!
//! Loads a config and a bar file, runs the backtest engine, and writes the
//! run artifacts:
//! - trade blotter, equity curve and metrics
//! - proof ledger (CSV table and JSON lines over the same capsules)
//! - run manifest and narrative summary

pub mod commands;
pub mod config_file;
pub mod export;
pub mod manifest;
pub mod narrative;

pub use commands::{run_backtest, run_sweep_configs, RunOptions, RunReport, SweepOptions};
pub use config_file::load_config;
pub use manifest::RunManifest;
