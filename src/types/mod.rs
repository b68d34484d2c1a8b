//! Wire types for the prediction boundary

pub mod prediction;

pub use prediction::{ErrorBody, HealthResponse, PredictionResponse};
