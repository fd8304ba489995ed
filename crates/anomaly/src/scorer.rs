//! Reconstruction-error scoring and the verdict handed back to the analyst.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use playwatch_core::ConfigError;

use crate::features::{FeatureVector, NormalizationStats, FEATURE_DIM};
use crate::reconstruction::{ReconstructionError, ReconstructionOracle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Normal,
    Anomaly,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Anomaly => write!(f, "ANOMALY"),
        }
    }
}

/// Human-readable view of a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub apm: f64,
    pub volume: f64,
    pub unique_players: f64,
    pub avg_price: f64,
}

impl From<&FeatureVector> for MetricSummary {
    fn from(v: &FeatureVector) -> Self {
        Self {
            apm: v.activity_rate(),
            volume: v.volume(),
            unique_players: v.distinct_actor_count(),
            avg_price: v.average_unit_price(),
        }
    }
}

/// Outcome of one scoring call. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub player_metrics: MetricSummary,
    pub baseline_metrics: MetricSummary,
    #[serde(rename = "anomaly_score")]
    pub score: f64,
    pub threshold: f64,
    #[serde(rename = "verdict")]
    pub classification: Classification,
}

impl AnomalyVerdict {
    pub fn is_anomaly(&self) -> bool {
        self.classification == Classification::Anomaly
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("raw metrics must be finite, got {0}")]
    NonFiniteInput(FeatureVector),

    #[error("reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    #[error("reconstruction has {actual} values, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("reconstruction error is not a finite number: {0}")]
    NonFiniteScore(f64),
}

/// Mean squared error between a vector and its reconstruction.
pub fn reconstruction_error(normalized: &FeatureVector, reconstructed: &[f64]) -> f64 {
    normalized
        .iter()
        .zip(reconstructed)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / FEATURE_DIM as f64
}

/// Threshold as the `quantile` of training reconstruction errors, linearly
/// interpolated between closest ranks.
pub fn threshold_from_errors(errors: &[f64], quantile: f64) -> Result<f64, ConfigError> {
    if !(0.0..=1.0).contains(&quantile) {
        return Err(ConfigError::invalid(
            "quantile",
            format!("{quantile} is outside [0, 1]"),
        ));
    }
    if errors.is_empty() {
        return Err(ConfigError::invalid("errors", "no reconstruction errors given"));
    }
    if errors.iter().any(|e| !e.is_finite()) {
        return Err(ConfigError::invalid("errors", "reconstruction errors must be finite"));
    }

    let mut sorted = errors.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = quantile * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Scores raw player metrics against a reconstruction oracle.
///
/// Shared read-only across conversations.
pub struct AnomalyScorer {
    stats: NormalizationStats,
    oracle: Arc<dyn ReconstructionOracle>,
    threshold: f64,
}

impl AnomalyScorer {
    pub fn new(
        stats: NormalizationStats,
        oracle: Arc<dyn ReconstructionOracle>,
        threshold: f64,
    ) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::invalid(
                "SCORING_THRESHOLD",
                format!("{threshold} is not a finite non-negative number"),
            ));
        }
        Ok(Self {
            stats,
            oracle,
            threshold,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    /// Normalize, reconstruct once, and classify. `score > threshold` is an
    /// anomaly; equality is normal.
    pub async fn score(&self, raw: &FeatureVector) -> Result<AnomalyVerdict, ScoreError> {
        if !raw.is_finite() {
            return Err(ScoreError::NonFiniteInput(*raw));
        }

        let normalized = self.stats.normalize(raw);
        let reconstructed = self.oracle.infer(&normalized).await?;
        if reconstructed.len() != FEATURE_DIM {
            return Err(ScoreError::DimensionMismatch {
                expected: FEATURE_DIM,
                actual: reconstructed.len(),
            });
        }

        let score = reconstruction_error(&normalized, &reconstructed);
        if !score.is_finite() {
            warn!(raw = %raw, score, "reconstruction error overflowed");
            return Err(ScoreError::NonFiniteScore(score));
        }
        let classification = if score > self.threshold {
            Classification::Anomaly
        } else {
            Classification::Normal
        };

        debug!(raw = %raw, normalized = %normalized, score, "scored player");
        if classification == Classification::Anomaly {
            info!(score, threshold = self.threshold, "anomalous behavior detected");
        }

        Ok(AnomalyVerdict {
            player_metrics: MetricSummary::from(raw),
            baseline_metrics: MetricSummary::from(&self.stats.mean()),
            score,
            threshold: self.threshold,
            classification,
        })
    }
}
