//! Standardization transforms persisted alongside the model.
//!
//! The feature scaler normalizes the tabular vector before it reaches the
//! regression head; the score scaler maps the head's normalized output back
//! to score units.

use crate::error::StartupError;
use crate::feature_extractor::{TabularFeature, TabularVector, FEATURE_COUNT};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-column `(x - mean) / scale` transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column names the scaler was fit on, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Parse and validate a persisted scaler. `source` is only used in errors.
    pub fn from_json(bytes: &[u8], source: &Path) -> Result<Self, StartupError> {
        let scaler: StandardScaler =
            serde_json::from_slice(bytes).map_err(|e| StartupError::corrupt(source, e))?;
        scaler.validate(source)?;
        Ok(scaler)
    }

    fn validate(&self, source: &Path) -> Result<(), StartupError> {
        if self.mean.is_empty() {
            return Err(StartupError::corrupt(source, "scaler has no columns"));
        }
        if self.mean.len() != self.scale.len() {
            return Err(StartupError::corrupt(
                source,
                format!(
                    "mean has {} entries but scale has {}",
                    self.mean.len(),
                    self.scale.len()
                ),
            ));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.mean.len() {
                return Err(StartupError::corrupt(
                    source,
                    format!(
                        "{} feature names for {} columns",
                        names.len(),
                        self.mean.len()
                    ),
                ));
            }
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(StartupError::corrupt(source, format!("mean[{}] is not finite", i)));
        }
        if let Some(i) = self.scale.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            return Err(StartupError::corrupt(
                source,
                format!("scale[{}] = {} is not a positive finite number", i, self.scale[i]),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Elementwise `(x - mean) / scale`. `values` must have `len()` entries.
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }

    /// Elementwise `z * scale + mean`. `values` must have `len()` entries.
    pub fn inverse_transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(z, (mean, scale))| z * scale + mean)
            .collect()
    }
}

/// Scaled tabular vector, ready to be fused with the image embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledFeatures(Array1<f32>);

impl ScaledFeatures {
    pub fn values(&self) -> &Array1<f32> {
        &self.0
    }
}

/// Scaler for the six tabular inputs, checked against the canonical order.
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    inner: StandardScaler,
}

impl FeatureScaler {
    pub fn new(inner: StandardScaler, source: &Path) -> Result<Self, StartupError> {
        if inner.len() != FEATURE_COUNT {
            return Err(StartupError::incompatible(
                source,
                format!(
                    "feature scaler has {} columns, model expects {}",
                    inner.len(),
                    FEATURE_COUNT
                ),
            ));
        }

        if let Some(names) = &inner.feature_names {
            for (feature, name) in TabularFeature::ALL.iter().zip(names) {
                if feature.name() != name {
                    return Err(StartupError::incompatible(
                        source,
                        format!(
                            "column {} is '{}', expected '{}'",
                            feature.index(),
                            name,
                            feature.name()
                        ),
                    ));
                }
            }
        }

        Ok(Self { inner })
    }

    /// Standardize in single precision: the centred value is rounded to
    /// f32 before it is divided, as the scaler did on the training inputs.
    pub fn transform(&self, features: &TabularVector) -> ScaledFeatures {
        let scaled = features
            .as_slice()
            .iter()
            .zip(self.inner.mean.iter().zip(&self.inner.scale))
            .map(|(&x, (mean, scale))| {
                let centred = (x as f64 - mean) as f32;
                (centred as f64 / scale) as f32
            });
        ScaledFeatures(scaled.collect())
    }

    pub fn inner(&self) -> &StandardScaler {
        &self.inner
    }
}

/// Column name the score scaler must have been fit on, when recorded.
pub const SCORE_COLUMN: &str = "score";

/// Single-column scaler fit on the training score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreScaler {
    mean: f64,
    scale: f64,
}

impl ScoreScaler {
    pub fn new(inner: StandardScaler, source: &Path) -> Result<Self, StartupError> {
        if inner.len() != 1 {
            return Err(StartupError::incompatible(
                source,
                format!("score scaler has {} columns, expected 1", inner.len()),
            ));
        }
        if let Some(names) = &inner.feature_names {
            if *names != [SCORE_COLUMN] {
                return Err(StartupError::incompatible(
                    source,
                    format!("score scaler was fit on {:?}, expected [\"{}\"]", names, SCORE_COLUMN),
                ));
            }
        }
        Ok(Self {
            mean: inner.mean[0],
            scale: inner.scale[0],
        })
    }

    pub fn transform(&self, score: f64) -> f64 {
        (score - self.mean) / self.scale
    }

    pub fn inverse_transform(&self, normalized: f64) -> f64 {
        normalized * self.scale + self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}
