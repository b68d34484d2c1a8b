//! One-shot Tile Predictor
//!
//! Loads the configured artifacts, scores a single image tile with its
//! feature map and prints the JSON response. Useful for checking a new
//! set of artifacts without starting the server.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use waterpoint_fusion::{
    init_tracing, AppConfig, ArtifactLoader, ErrorBody, FeatureMap, PredictionResponse,
    PredictionService,
};

#[derive(Debug, Parser)]
#[command(name = "predict-tile", about = "Score one satellite tile with its geospatial features")]
struct Args {
    /// Service configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Encoded image tile (PNG, JPEG, ...)
    #[arg(long)]
    image: PathBuf,

    /// Feature map as a JSON object
    #[arg(long, conflicts_with = "features_file", required_unless_present = "features_file")]
    features: Option<String>,

    /// File holding the feature map as a JSON object
    #[arg(long)]
    features_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    // A single call needs a single encoder session.
    config.inference.workers = 1;
    init_tracing(&config.logging)?;

    let features_text = match (&args.features, &args.features_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read features from {}", path.display()))?,
        (None, None) => anyhow::bail!("either --features or --features-file is required"),
    };
    let image = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;

    let start = Instant::now();
    let context = ArtifactLoader::new(&config.artifacts, &config.inference).load_context()?;
    info!("Artifacts loaded in {:?}", start.elapsed());

    let service = PredictionService::new(Arc::new(context));

    let result = FeatureMap::from_json(&features_text)
        .and_then(|features| service.predict(Some(image.as_slice()), Some(&features)));

    match result {
        Ok(predicted_score) => {
            println!("{}", serde_json::to_string(&PredictionResponse { predicted_score })?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&ErrorBody::from(&e))?);
            std::process::exit(if e.is_client_error() { 2 } else { 1 });
        }
    }
}
