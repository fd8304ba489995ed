//! Scoring through the public API with a deterministic reconstruction oracle.

use std::sync::Arc;

use async_trait::async_trait;
use playwatch_anomaly::{
    AnomalyScorer, Classification, FeatureVector, NormalizationStats, ReconstructionError,
    ReconstructionOracle,
};

/// Perfect autoencoder.
struct Echo;

#[async_trait]
impl ReconstructionOracle for Echo {
    async fn infer(&self, normalized: &FeatureVector) -> Result<Vec<f64>, ReconstructionError> {
        Ok(normalized.iter().collect())
    }
}

/// Reconstructs everything as the training mean.
struct Flat;

#[async_trait]
impl ReconstructionOracle for Flat {
    async fn infer(&self, _normalized: &FeatureVector) -> Result<Vec<f64>, ReconstructionError> {
        Ok(vec![0.0; 4])
    }
}

fn stats() -> NormalizationStats {
    NormalizationStats::new(
        [27.8, 50000.0, 1.0, 100000.0],
        [10.0, 20000.0, 1.0, 50000.0],
        1e-6,
    )
    .unwrap()
}

#[tokio::test]
async fn identity_reconstruction_is_normal_even_for_extreme_player() {
    let scorer = AnomalyScorer::new(stats(), Arc::new(Echo), 0.05).unwrap();
    let verdict = scorer
        .score(&FeatureVector::new(4700.0, 250000.0, 1.0, 90000.0))
        .await
        .unwrap();

    assert_eq!(verdict.score, 0.0);
    assert_eq!(verdict.classification, Classification::Normal);

    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["verdict"], "NORMAL");
    assert_eq!(json["player_metrics"]["apm"], 4700.0);
    assert_eq!(json["player_metrics"]["volume"], 250000.0);
    assert_eq!(json["baseline_metrics"]["apm"], 27.8);
}

#[tokio::test]
async fn bot_is_flagged_when_autoencoder_reconstructs_normal_behavior() {
    let scorer = AnomalyScorer::new(stats(), Arc::new(Flat), 0.05).unwrap();

    let normal = scorer
        .score(&FeatureVector::new(28.0, 50500.0, 1.0, 99000.0))
        .await
        .unwrap();
    assert_eq!(normal.classification, Classification::Normal);

    let bot = scorer
        .score(&FeatureVector::new(4700.0, 250000.0, 1.0, 90000.0))
        .await
        .unwrap();
    assert_eq!(bot.classification, Classification::Anomaly);
    assert!(bot.score > 1000.0);
}
