//! Reconstruction-error anomaly scoring for player behavior.
//!
//! Raw counters are normalized with the training-time statistics, sent to an
//! autoencoder served behind a [`ReconstructionOracle`], and the mean squared
//! reconstruction error is compared against a fixed threshold.

pub mod calibrate;
pub mod features;
pub mod publish;
pub mod reconstruction;
pub mod scorer;

pub use calibrate::{calibrate_threshold, feature_rows, CalibrationError};
pub use features::{FeatureVector, NormalizationStats, FEATURE_DIM, FEATURE_NAMES};
pub use publish::{
    collect_artifacts, ArtifactPublisher, PublishError, PublishedModel, VertexPublisher,
    VertexPublisherSettings,
};
pub use reconstruction::{ReconstructionError, ReconstructionOracle, VertexEndpointClient};
pub use scorer::{
    reconstruction_error, threshold_from_errors, AnomalyScorer, AnomalyVerdict, Classification,
    MetricSummary, ScoreError,
};
