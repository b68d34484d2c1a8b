//! Error taxonomy for the prediction pipeline.
//!
//! Two families: [`PredictionError`] is recovered per request and turned into
//! a client-visible response, [`StartupError`] means the artifacts cannot be
//! served and the process must not accept traffic.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while serving a single prediction.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// A required request field (image or feature payload) is absent or malformed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A required tabular feature is absent from the feature map
    #[error("missing feature: {0}")]
    MissingFeature(&'static str),

    /// A tabular feature is present but cannot be coerced to a finite number
    #[error("invalid value for feature '{name}': {reason}")]
    InvalidFeature { name: &'static str, reason: String },

    /// The image bytes could not be decoded
    #[error("could not decode image: {0}")]
    Decode(String),

    /// The forward pass failed for a reason unrelated to the request contents
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PredictionError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::BadRequest(_) => "bad_request",
            PredictionError::MissingFeature(_) => "missing_feature",
            PredictionError::InvalidFeature { .. } => "invalid_feature",
            PredictionError::Decode(_) => "decode_error",
            PredictionError::Inference(_) => "inference_error",
        }
    }

    /// HTTP-style status code for this error
    pub fn status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Whether the caller can fix this error by changing the request
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PredictionError::Inference(_))
    }
}

impl From<image::ImageError> for PredictionError {
    fn from(err: image::ImageError) -> Self {
        PredictionError::Decode(err.to_string())
    }
}

/// Fatal errors while loading model artifacts at process start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("artifact not found: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("failed to read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt artifact {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("incompatible artifact {}: {reason}", path.display())]
    Incompatible { path: PathBuf, reason: String },

    #[error("failed to create inference session from {}: {reason}", path.display())]
    Session { path: PathBuf, reason: String },
}

impl StartupError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StartupError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn incompatible(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StartupError::Incompatible {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        let errors = [
            PredictionError::BadRequest("no image".to_string()),
            PredictionError::MissingFeature("slope"),
            PredictionError::InvalidFeature {
                name: "elevation",
                reason: "not a number".to_string(),
            },
            PredictionError::Decode("bad header".to_string()),
        ];

        for err in &errors {
            assert!(err.is_client_error());
            assert_eq!(err.status(), 400);
        }
    }

    #[test]
    fn test_inference_error_is_internal() {
        let err = PredictionError::Inference("session lock poisoned".to_string());
        assert!(!err.is_client_error());
        assert_eq!(err.status(), 500);
        assert_eq!(err.kind(), "inference_error");
    }

    #[test]
    fn test_missing_feature_message_names_feature() {
        let err = PredictionError::MissingFeature("mean_ndvi");
        assert_eq!(err.to_string(), "missing feature: mean_ndvi");
        assert_eq!(err.kind(), "missing_feature");
    }
}
