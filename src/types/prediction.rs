//! Prediction request/response payloads

use crate::error::PredictionError;
use serde::{Deserialize, Serialize};

/// Successful prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Viability score in the units the model was trained on
    pub predicted_score: f64,
}

/// Structured error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl From<&PredictionError> for ErrorBody {
    fn from(err: &PredictionError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

/// Liveness payload, describing the loaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub embedding_dim: usize,
    pub hidden_width: usize,
    pub features: Vec<String>,
}
