//! Water-Point Viability Fusion Library
//!
//! Scores a candidate water-point site from a satellite image tile and six
//! geospatial features, using a visual encoder whose embedding is fused
//! with the scaled features and passed through a small regression head.

pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod http;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod scaler;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use error::{PredictionError, StartupError};
pub use feature_extractor::{FeatureExtractor, FeatureMap, TabularFeature};
pub use models::{ArtifactLoader, ModelContext};
pub use service::{PredictionRequest, PredictionService};
pub use types::{ErrorBody, HealthResponse, PredictionResponse};

use config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the crate logs at the configured
/// level and everything else at `warn`.
pub fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("waterpoint_fusion={}", logging.level).parse()?)
            .add_directive(format!("predict_tile={}", logging.level).parse()?),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
