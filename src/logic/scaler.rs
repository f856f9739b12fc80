//! Scaler Artifact - Normalization bounds written by training
//!
//! The binary persists per-feature min/max bounds after every successful
//! training run. They are read fresh before each prediction cycle and
//! never cached, so bounds from an earlier run are never trusted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logic::dataset::{Features, FEATURE_COUNT, FEATURE_NAMES};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    /// Always a symptom of a training run that did not complete
    #[error("scaler file not found at {0:?}, train the model first")]
    Missing(PathBuf),
    #[error("failed to read scaler file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scaler file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

// ============================================================================
// ARTIFACT
// ============================================================================

/// On-disk shape, validated into `ScalerArtifact`
#[derive(Debug, Deserialize)]
struct RawScaler {
    min_vals: Vec<f64>,
    max_vals: Vec<f64>,
}

/// Validated normalization bounds: 14 entries each, `min <= max`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalerArtifact {
    min_vals: Features,
    max_vals: Features,
}

/// A feature value outside the bounds seen during training
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsViolation {
    pub feature: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl ScalerArtifact {
    pub fn min_vals(&self) -> &Features {
        &self.min_vals
    }

    pub fn max_vals(&self) -> &Features {
        &self.max_vals
    }

    /// Parse and validate artifact JSON
    pub fn from_json(content: &str) -> Result<Self, String> {
        let raw: RawScaler = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let min_vals = to_features("min_vals", &raw.min_vals)?;
        let max_vals = to_features("max_vals", &raw.max_vals)?;

        for i in 0..FEATURE_COUNT {
            if !min_vals[i].is_finite() || !max_vals[i].is_finite() {
                return Err(format!("non-finite bound for {}", FEATURE_NAMES[i]));
            }
            if min_vals[i] > max_vals[i] {
                return Err(format!(
                    "min {} exceeds max {} for {}",
                    min_vals[i], max_vals[i], FEATURE_NAMES[i]
                ));
            }
        }

        Ok(Self { min_vals, max_vals })
    }

    /// Features the binary will have to extrapolate for
    pub fn out_of_bounds(&self, features: &Features) -> Vec<BoundsViolation> {
        (0..FEATURE_COUNT)
            .filter(|&i| features[i] < self.min_vals[i] || features[i] > self.max_vals[i])
            .map(|i| BoundsViolation {
                feature: FEATURE_NAMES[i],
                value: features[i],
                min: self.min_vals[i],
                max: self.max_vals[i],
            })
            .collect()
    }
}

fn to_features(field: &str, values: &[f64]) -> Result<Features, String> {
    <Features>::try_from(values).map_err(|_| {
        format!("{} has {} entries, expected {}", field, values.len(), FEATURE_COUNT)
    })
}

// ============================================================================
// LOADING
// ============================================================================

/// Read the artifact from disk; called once per prediction cycle
pub fn load_scaler(path: &Path) -> Result<ScalerArtifact, ScalerError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScalerError::Missing(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ScalerError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let scaler = ScalerArtifact::from_json(&content).map_err(|reason| ScalerError::Parse {
        path: path.to_path_buf(),
        reason,
    })?;

    log::debug!("Scaler artifact loaded from {:?}", path);
    Ok(scaler)
}
