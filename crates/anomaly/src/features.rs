//! Fixed-order behavioral feature vectors and their normalization.

use std::fmt;
use std::ops::Index;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use playwatch_core::config::ScoringConfig;
use playwatch_core::ConfigError;

pub const FEATURE_DIM: usize = 4;

/// Feature names in vector order. Position is meaning.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "activity_rate",
    "volume",
    "distinct_actor_count",
    "average_unit_price",
];

/// `[activity_rate, volume, distinct_actor_count, average_unit_price]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn new(
        activity_rate: f64,
        volume: f64,
        distinct_actor_count: f64,
        average_unit_price: f64,
    ) -> Self {
        Self([activity_rate, volume, distinct_actor_count, average_unit_price])
    }

    pub fn activity_rate(&self) -> f64 {
        self.0[0]
    }

    pub fn volume(&self) -> f64 {
        self.0[1]
    }

    pub fn distinct_actor_count(&self) -> f64 {
        self.0[2]
    }

    pub fn average_unit_price(&self) -> f64 {
        self.0[3]
    }

    pub fn as_array(&self) -> &[f64; FEATURE_DIM] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl From<[f64; FEATURE_DIM]> for FeatureVector {
    fn from(values: [f64; FEATURE_DIM]) -> Self {
        Self(values)
    }
}

impl Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Per-dimension mean and scale captured when the autoencoder was trained.
///
/// Immutable once built; every constructor validates, so `normalize` has no
/// failure modes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationStats {
    mean: [f64; FEATURE_DIM],
    scale: [f64; FEATURE_DIM],
    epsilon: f64,
}

/// On-disk form, e.g. `{"mean": [...], "scale": [...], "epsilon": 1e-6}`.
#[derive(Deserialize)]
struct StatsFile {
    mean: Vec<f64>,
    scale: Vec<f64>,
    epsilon: Option<f64>,
}

impl NormalizationStats {
    pub fn new(
        mean: [f64; FEATURE_DIM],
        scale: [f64; FEATURE_DIM],
        epsilon: f64,
    ) -> Result<Self, ConfigError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(ConfigError::invalid(
                "SCORING_EPSILON",
                format!("{epsilon} must be a positive finite number"),
            ));
        }
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            if !mean[i].is_finite() {
                return Err(ConfigError::invalid(
                    "SCORING_MEAN",
                    format!("{name} mean is {}", mean[i]),
                ));
            }
            if !scale[i].is_finite() || scale[i] + epsilon == 0.0 {
                return Err(ConfigError::invalid(
                    "SCORING_SCALE",
                    format!("{name} scale {} cannot be used as a divisor", scale[i]),
                ));
            }
        }
        Ok(Self {
            mean,
            scale,
            epsilon,
        })
    }

    /// Build from unsized slices, checking dimensionality.
    pub fn from_slices(mean: &[f64], scale: &[f64], epsilon: f64) -> Result<Self, ConfigError> {
        Self::new(
            to_array("SCORING_MEAN", mean)?,
            to_array("SCORING_SCALE", scale)?,
            epsilon,
        )
    }

    /// Load from a JSON stats file. A missing `epsilon` falls back to
    /// `default_epsilon`.
    pub fn from_json_file(path: &Path, default_epsilon: f64) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: StatsFile = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?;
        debug!(path = %path.display(), "loaded normalization stats");
        Self::from_slices(
            &file.mean,
            &file.scale,
            file.epsilon.unwrap_or(default_epsilon),
        )
    }

    /// Write in the form `from_json_file` reads.
    pub fn to_json_file(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?;
        std::fs::write(path, body).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "wrote normalization stats");
        Ok(())
    }

    /// Resolve stats from the scoring section: the stats file wins over the
    /// inline `SCORING_MEAN` / `SCORING_SCALE` lists.
    pub fn from_config(config: &ScoringConfig) -> Result<Self, ConfigError> {
        if let Some(path) = &config.stats_path {
            return Self::from_json_file(path, config.epsilon);
        }
        match (&config.mean, &config.scale) {
            (Some(mean), Some(scale)) => Self::from_slices(mean, scale, config.epsilon),
            (None, _) => Err(ConfigError::Missing("SCORING_MEAN")),
            (_, None) => Err(ConfigError::Missing("SCORING_SCALE")),
        }
    }

    /// Compute mean and population standard deviation per dimension from
    /// training rows. A constant column gets scale `1.0`.
    pub fn fit(rows: &[FeatureVector], epsilon: f64) -> Result<Self, ConfigError> {
        if rows.is_empty() {
            return Err(ConfigError::invalid("training rows", "cannot fit on zero rows"));
        }
        let n = rows.len() as f64;

        let mut mean = [0.0; FEATURE_DIM];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = [0.0; FEATURE_DIM];
        for row in rows {
            for i in 0..FEATURE_DIM {
                let diff = row[i] - mean[i];
                scale[i] += diff * diff;
            }
        }
        for s in scale.iter_mut() {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self::new(mean, scale, epsilon)
    }

    /// `(raw[i] - mean[i]) / (scale[i] + epsilon)` per dimension.
    pub fn normalize(&self, raw: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_DIM];
        for (i, v) in out.iter_mut().enumerate() {
            *v = (raw[i] - self.mean[i]) / (self.scale[i] + self.epsilon);
        }
        FeatureVector(out)
    }

    /// Training-time mean, i.e. the "normal player" baseline.
    pub fn mean(&self) -> FeatureVector {
        FeatureVector(self.mean)
    }

    pub fn scale(&self) -> &[f64; FEATURE_DIM] {
        &self.scale
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

fn to_array(key: &str, values: &[f64]) -> Result<[f64; FEATURE_DIM], ConfigError> {
    values
        .try_into()
        .map_err(|_| ConfigError::DimensionMismatch {
            what: key.to_string(),
            expected: FEATURE_DIM,
            actual: values.len(),
        })
}
