//! Run manifest (`proof_capsule.json`).
//!
//! Pins what a run consumed (config, data file hash) next to what it
//! concluded (verdict, collapse evidence, metrics, status).

use anyhow::{Context, Result};
use living_backtest::{AbortReason, BacktestMetrics, EngineState, RunArtifacts};
use living_core::Config;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Manifest schema version.
pub const SCHEMA_VERSION: &str = "capsule-1.1.0";

/// Verdict when at least one bar collapsed.
pub const VERDICT_CLAIM: &str = "P≠NP (claim)";

/// Verdict when no bar collapsed.
pub const VERDICT_OPEN: &str = "OPEN";

/// Collapse evidence as recorded in the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub collapse_hits: usize,
    pub open_window: usize,
    pub collapse_threshold: Option<f64>,
    pub regime_boundaries: Vec<f64>,
}

/// Run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub schema: String,
    pub created_utc: String,
    pub data_source: String,
    pub data_sha256: String,
    pub strategy: String,
    pub params: Config,
    pub verdict: String,
    pub evidence: Evidence,
    pub metrics: Option<BacktestMetrics>,
    pub status: EngineState,
    pub complete: bool,
    pub abort_reason: Option<AbortReason>,
    pub bars_processed: usize,
    pub capsules_written: usize,
    /// Digest of the last capsule, when the hash chain is enabled.
    pub final_digest: Option<String>,
}

impl RunManifest {
    /// Build the manifest for a finished or aborted run.
    pub fn new(
        config: &Config,
        artifacts: &RunArtifacts,
        metrics: Option<&BacktestMetrics>,
        data_source: &Path,
        data_sha256: String,
    ) -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            created_utc: chrono::Utc::now().to_rfc3339(),
            data_source: data_source.display().to_string(),
            data_sha256,
            strategy: artifacts.strategy.clone(),
            params: config.clone(),
            verdict: verdict(artifacts.collapse.hits).to_string(),
            evidence: Evidence {
                collapse_hits: artifacts.collapse.hits,
                open_window: artifacts.collapse.open_window,
                collapse_threshold: config.capsule.collapse_threshold,
                regime_boundaries: config.capsule.regime_boundaries.clone(),
            },
            metrics: metrics.cloned(),
            status: artifacts.status,
            complete: artifacts.is_complete(),
            abort_reason: artifacts.abort_reason.clone(),
            bars_processed: artifacts.bars_processed(),
            capsules_written: artifacts.capsules.len(),
            final_digest: artifacts.capsules.last().and_then(|c| c.digest.clone()),
        }
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize run manifest")
    }
}

/// Verdict for a number of collapse hits.
pub fn verdict(collapse_hits: usize) -> &'static str {
    if collapse_hits > 0 {
        VERDICT_CLAIM
    } else {
        VERDICT_OPEN
    }
}

/// Hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict() {
        assert_eq!(verdict(0), "OPEN");
        assert_eq!(verdict(3), "P≠NP (claim)");
    }

    #[test]
    fn test_file_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
