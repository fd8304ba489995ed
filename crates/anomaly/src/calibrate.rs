//! Deriving normalization stats and a threshold from historical per-minute
//! rows, for operators setting up a new deployment.

use serde_json::{Map, Value};
use tracing::{debug, info};

use playwatch_core::ConfigError;

use crate::features::{FeatureVector, NormalizationStats, FEATURE_DIM};
use crate::reconstruction::{ReconstructionError, ReconstructionOracle};
use crate::scorer::{reconstruction_error, threshold_from_errors};

/// Warehouse columns, in feature-vector order.
pub const TRAINING_COLUMNS: [&str; FEATURE_DIM] = [
    "transaction_count",
    "total_quantity",
    "unique_players",
    "avg_price",
];

/// Training runs flag anything above the 99th percentile of their own errors.
pub const DEFAULT_QUANTILE: f64 = 0.99;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("row {row}: column '{column}' is not numeric: {value}")]
    BadCell {
        row: usize,
        column: &'static str,
        value: Value,
    },

    #[error("reconstruction failed on row {row}: {source}")]
    Reconstruction {
        row: usize,
        #[source]
        source: ReconstructionError,
    },

    #[error("row {row}: reconstruction has {actual} values, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One warehouse row as a feature vector. Missing and NULL cells count as
/// zero, numeric strings are parsed.
pub fn feature_row(index: usize, row: &Map<String, Value>) -> Result<FeatureVector, CalibrationError> {
    let mut values = [0.0; FEATURE_DIM];
    for (slot, column) in values.iter_mut().zip(TRAINING_COLUMNS) {
        *slot = match row.get(column) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
            Some(_) => f64::NAN,
        };
        if !slot.is_finite() {
            return Err(CalibrationError::BadCell {
                row: index,
                column,
                value: row.get(column).cloned().unwrap_or(Value::Null),
            });
        }
    }
    Ok(FeatureVector::from(values))
}

pub fn feature_rows(rows: &[Map<String, Value>]) -> Result<Vec<FeatureVector>, CalibrationError> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| feature_row(i, row))
        .collect()
}

/// Reconstruction error of every row, one oracle call each, in order.
pub async fn reconstruction_errors(
    stats: &NormalizationStats,
    oracle: &dyn ReconstructionOracle,
    rows: &[FeatureVector],
) -> Result<Vec<f64>, CalibrationError> {
    let mut errors = Vec::with_capacity(rows.len());
    for (i, raw) in rows.iter().enumerate() {
        let normalized = stats.normalize(raw);
        let reconstructed = oracle
            .infer(&normalized)
            .await
            .map_err(|source| CalibrationError::Reconstruction { row: i, source })?;
        if reconstructed.len() != FEATURE_DIM {
            return Err(CalibrationError::DimensionMismatch {
                row: i,
                expected: FEATURE_DIM,
                actual: reconstructed.len(),
            });
        }
        errors.push(reconstruction_error(&normalized, &reconstructed));
    }
    debug!(rows = errors.len(), "computed reconstruction errors");
    Ok(errors)
}

/// Threshold at `quantile` of the reconstruction errors over `rows`.
pub async fn calibrate_threshold(
    stats: &NormalizationStats,
    oracle: &dyn ReconstructionOracle,
    rows: &[FeatureVector],
    quantile: f64,
) -> Result<f64, CalibrationError> {
    let errors = reconstruction_errors(stats, oracle, rows).await?;
    let threshold = threshold_from_errors(&errors, quantile)?;
    info!(rows = rows.len(), quantile, threshold, "calibrated threshold");
    Ok(threshold)
}
