//! Water-Point Viability Service - Main Entry Point
//!
//! Loads the fusion model artifacts once, then serves predictions over HTTP.
//! Refuses to start when any artifact is missing or incompatible.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use waterpoint_fusion::{
    config::AppConfig,
    http::{build_router, AppState},
    init_tracing,
    metrics::{MetricsReporter, ServiceMetrics},
    models::ArtifactLoader,
    service::PredictionService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (optional path as first argument)
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::load()?,
    };

    init_tracing(&config.logging)?;

    info!("Starting Water-Point Viability Service");
    info!(
        "Artifacts: dir={}, encoder={}, head={}",
        config.artifacts.dir.display(),
        config.artifacts.encoder,
        config.artifacts.head
    );

    // Load model artifacts; any failure here is fatal
    let loader = ArtifactLoader::new(&config.artifacts, &config.inference);
    let context = match loader.load_context() {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!(error = %e, "Failed to load model artifacts");
            return Err(e).context("Refusing to start without valid model artifacts");
        }
    };
    info!(
        "Fusion model ready: embedding_dim={}, hidden_width={}, encoder sessions={}",
        context.model().embedding_dim(),
        context.model().hidden_width(),
        context.model().encoder().pool_size()
    );

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let service = PredictionService::new(context);
    let state = Arc::new(AppState::new(service, metrics.clone(), config.inference.workers));
    let app = build_router(state, config.server.max_upload_bytes);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "Listening on http://{} with {} prediction workers",
        addr, config.inference.workers
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
