//! Proof capsule recording.
//!
//! One capsule per processed bar, append-only. The glyph is the regime
//! label selected by the configured entropy boundaries; the collapse flag
//! is set when entropy reaches the collapse threshold. With hash chaining
//! enabled each capsule carries the SHA-256 of the previous capsule and of
//! its own canonical JSON.

use living_core::{
    config::CapsuleConfig, Annotation, Bar, EntropySource, PortfolioState, ProofCapsule, Result,
};
use living_features::RollingEntropy;
use ordered_float::OrderedFloat;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Glyph used before any entropy is available.
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Per-bar context the engine hands to the recorder besides the portfolio.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    /// Trades filled on the bar.
    pub fills: usize,
    /// Rejected, skipped or clipped intents on the bar.
    pub annotations: Vec<Annotation>,
    /// Strategy diagnostics.
    pub notes: BTreeMap<String, f64>,
}

/// Collapse evidence accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollapseEvidence {
    /// Bars flagged as collapsed.
    pub hits: usize,
    /// Collapse window still open at the end of the run.
    ///
    /// Grows by one on every collapsed bar and decays by one on every
    /// calm bar.
    pub open_window: usize,
}

/// Append-only proof capsule recorder.
pub struct CapsuleRecorder {
    config: CapsuleConfig,
    /// Realized entropy per symbol for bars without a reading.
    realized: BTreeMap<String, RollingEntropy>,
    capsules: Vec<ProofCapsule>,
    last_digest: Option<String>,
    evidence: CollapseEvidence,
}

impl CapsuleRecorder {
    /// Create a new recorder.
    pub fn new(config: CapsuleConfig) -> Self {
        Self {
            config,
            realized: BTreeMap::new(),
            capsules: Vec::new(),
            last_digest: None,
            evidence: CollapseEvidence::default(),
        }
    }

    /// Regime index and label for an entropy score.
    pub fn classify(&self, entropy: f64) -> (usize, String) {
        let score = OrderedFloat(entropy);
        let index = self
            .config
            .regime_boundaries
            .partition_point(|b| OrderedFloat(*b) <= score);
        (index, self.config.label(index))
    }

    /// Whether `entropy` reaches the collapse threshold.
    pub fn is_collapse(&self, entropy: f64) -> bool {
        self.config
            .collapse_threshold
            .map(|threshold| entropy >= threshold)
            .unwrap_or(false)
    }

    /// Record the capsule for `bar`.
    pub fn capture(
        &mut self,
        bar: &Bar,
        portfolio: &PortfolioState,
        step: StepContext,
    ) -> Result<&ProofCapsule> {
        let window = self.config.entropy_window;
        let realized = self
            .realized
            .entry(bar.symbol.clone())
            .or_insert_with(|| RollingEntropy::new(window))
            .add_close(bar.close);

        let (entropy_score, entropy_source) = match bar.entropy.filter(|e| e.is_finite()) {
            Some(reading) => (Some(reading), EntropySource::Reading),
            None => match realized {
                Some(value) => (Some(value), EntropySource::Realized),
                None => (None, EntropySource::Unavailable),
            },
        };

        let (regime, glyph, collapse_flag) = match entropy_score {
            Some(score) => {
                let (index, label) = self.classify(score);
                (Some(index), label, self.is_collapse(score))
            }
            None => (None, UNCLASSIFIED.to_string(), false),
        };

        if collapse_flag {
            self.evidence.hits += 1;
            self.evidence.open_window += 1;
        } else {
            self.evidence.open_window = self.evidence.open_window.saturating_sub(1);
        }

        let mut capsule = ProofCapsule {
            seq: self.capsules.len() as u64,
            timestamp: bar.timestamp,
            symbol: bar.symbol.clone(),
            glyph,
            regime,
            entropy_score,
            entropy_source,
            collapse_flag,
            verdict: portfolio.posture(&bar.symbol),
            cash: portfolio.cash,
            equity: portfolio.mark_to_market_equity,
            fills: step.fills,
            annotations: step.annotations,
            notes: step.notes,
            prev_digest: None,
            digest: None,
        };

        if self.config.hash_chain {
            capsule.prev_digest = self.last_digest.clone();
            let digest = capsule_digest(&capsule)?;
            self.last_digest = Some(digest.clone());
            capsule.digest = Some(digest);
        }

        tracing::debug!(
            seq = capsule.seq,
            symbol = %capsule.symbol,
            glyph = %capsule.glyph,
            collapse = capsule.collapse_flag,
            "captured capsule"
        );

        self.capsules.push(capsule);
        let index = self.capsules.len() - 1;
        Ok(&self.capsules[index])
    }

    /// Capsules recorded so far.
    pub fn capsules(&self) -> &[ProofCapsule] {
        &self.capsules
    }

    /// Number of capsules recorded.
    pub fn len(&self) -> usize {
        self.capsules.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.capsules.is_empty()
    }

    /// Collapse evidence so far.
    pub fn evidence(&self) -> CollapseEvidence {
        self.evidence
    }

    /// Consume the recorder, returning the capsules.
    pub fn into_capsules(self) -> Vec<ProofCapsule> {
        self.capsules
    }
}

/// Sort object keys recursively.
fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 over the canonical JSON of `capsule` without its own digest.
pub fn capsule_digest(capsule: &ProofCapsule) -> Result<String> {
    let mut clone = capsule.clone();
    clone.digest = None;

    let canonical = serde_json::to_string(&sort_keys(&serde_json::to_value(&clone)?))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    /// Every capsule links to its predecessor and matches its digest.
    Valid { capsules: usize },
    /// The chain breaks at capsule `seq`.
    Broken { seq: u64, reason: String },
}

/// Verify the digest chain of a capsule sequence.
pub fn verify_chain(capsules: &[ProofCapsule]) -> Result<ChainVerification> {
    let mut prev: Option<&String> = None;
    for capsule in capsules {
        if capsule.prev_digest.as_ref() != prev {
            return Ok(ChainVerification::Broken {
                seq: capsule.seq,
                reason: format!(
                    "prev_digest mismatch: expected {:?}, got {:?}",
                    prev, capsule.prev_digest
                ),
            });
        }
        let Some(claimed) = capsule.digest.as_ref() else {
            return Ok(ChainVerification::Broken {
                seq: capsule.seq,
                reason: "missing digest".to_string(),
            });
        };
        let recomputed = capsule_digest(capsule)?;
        if *claimed != recomputed {
            return Ok(ChainVerification::Broken {
                seq: capsule.seq,
                reason: format!("digest mismatch: claimed {claimed}, recomputed {recomputed}"),
            });
        }
        prev = Some(claimed);
    }
    Ok(ChainVerification::Valid {
        capsules: capsules.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use living_core::Posture;

    fn make_bar(i: i64, close: f64, entropy: Option<f64>) -> Bar {
        Bar {
            symbol: "CL".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            entropy,
        }
    }

    fn config() -> CapsuleConfig {
        CapsuleConfig {
            collapse_threshold: Some(0.8),
            regime_boundaries: vec![0.3, 0.6],
            regime_labels: Some(vec!["P".into(), "EDGE".into(), "NP".into()]),
            entropy_window: 3,
            hash_chain: true,
        }
    }

    #[test]
    fn test_classify_boundaries() {
        let recorder = CapsuleRecorder::new(config());
        assert_eq!(recorder.classify(0.1), (0, "P".to_string()));
        // Boundary belongs to the upper regime
        assert_eq!(recorder.classify(0.3), (1, "EDGE".to_string()));
        assert_eq!(recorder.classify(0.9), (2, "NP".to_string()));
        assert!(recorder.is_collapse(0.8));
        assert!(!recorder.is_collapse(0.79));
    }

    #[test]
    fn test_no_threshold_never_collapses() {
        let recorder = CapsuleRecorder::new(CapsuleConfig::default());
        assert!(!recorder.is_collapse(1e9));
        assert_eq!(recorder.classify(0.5), (0, "R0".to_string()));
    }

    #[test]
    fn test_reading_preferred_over_realized() {
        let mut recorder = CapsuleRecorder::new(config());
        let portfolio = PortfolioState::with_cash(1_000.0);

        let capsule = recorder
            .capture(&make_bar(0, 100.0, Some(0.9)), &portfolio, StepContext::default())
            .unwrap();
        assert_eq!(capsule.entropy_source, EntropySource::Reading);
        assert_eq!(capsule.glyph, "NP");
        assert!(capsule.collapse_flag);
        assert_eq!(capsule.verdict, Posture::Flat);
        assert_eq!(recorder.evidence().hits, 1);
    }

    #[test]
    fn test_realized_fallback_and_warmup() {
        let mut recorder = CapsuleRecorder::new(config());
        let portfolio = PortfolioState::with_cash(1_000.0);

        for (i, close) in [100.0, 110.0].into_iter().enumerate() {
            let capsule = recorder
                .capture(&make_bar(i as i64, close, None), &portfolio, StepContext::default())
                .unwrap();
            assert_eq!(capsule.entropy_source, EntropySource::Unavailable);
            assert_eq!(capsule.glyph, UNCLASSIFIED);
            assert!(capsule.regime.is_none());
        }

        // Returns +10%, -10% -> realized entropy 0.1
        let capsule = recorder
            .capture(&make_bar(2, 99.0, None), &portfolio, StepContext::default())
            .unwrap();
        assert_eq!(capsule.entropy_source, EntropySource::Realized);
        approx::assert_relative_eq!(capsule.entropy_score.unwrap(), 0.1, epsilon = 1e-12);
        assert_eq!(capsule.glyph, "P");
        assert_eq!(capsule.seq, 2);
    }

    #[test]
    fn test_open_window_decays() {
        let mut recorder = CapsuleRecorder::new(config());
        let portfolio = PortfolioState::with_cash(1_000.0);
        let readings = [0.9, 0.95, 0.1, 0.1, 0.1];
        for (i, e) in readings.into_iter().enumerate() {
            recorder
                .capture(&make_bar(i as i64, 100.0, Some(e)), &portfolio, StepContext::default())
                .unwrap();
        }
        let evidence = recorder.evidence();
        assert_eq!(evidence.hits, 2);
        assert_eq!(evidence.open_window, 0);
    }

    #[test]
    fn test_hash_chain_verifies_and_detects_tamper() {
        let mut recorder = CapsuleRecorder::new(config());
        let portfolio = PortfolioState::with_cash(1_000.0);
        for i in 0..4 {
            recorder
                .capture(&make_bar(i, 100.0 + i as f64, Some(0.2)), &portfolio, StepContext::default())
                .unwrap();
        }
        let mut capsules = recorder.into_capsules();
        assert!(capsules[0].prev_digest.is_none());
        assert_eq!(capsules[1].prev_digest, capsules[0].digest);
        assert_eq!(
            verify_chain(&capsules).unwrap(),
            ChainVerification::Valid { capsules: 4 }
        );

        capsules[2].equity += 1.0;
        match verify_chain(&capsules).unwrap() {
            ChainVerification::Broken { seq, .. } => assert_eq!(seq, 2),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn test_chain_disabled() {
        let mut recorder = CapsuleRecorder::new(CapsuleConfig {
            hash_chain: false,
            ..config()
        });
        let portfolio = PortfolioState::with_cash(1_000.0);
        let capsule = recorder
            .capture(&make_bar(0, 100.0, None), &portfolio, StepContext::default())
            .unwrap();
        assert!(capsule.digest.is_none());
    }
}
