//! HTTP boundary for the prediction service.
//!
//! `POST /predict/` takes a multipart form with an `image` file and a
//! `features` JSON text field and answers `{"predicted_score": ...}`.
//! Every per-request failure is turned into a JSON error body here.

use crate::error::PredictionError;
use crate::feature_extractor::TabularFeature;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::models::encoder::VisualEncoder;
use crate::service::{PredictionRequest, PredictionService};
use crate::types::{ErrorBody, HealthResponse, PredictionResponse};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared state handed to every handler
pub struct AppState<E> {
    pub service: Arc<PredictionService<E>>,
    pub metrics: Arc<ServiceMetrics>,
    /// Limits concurrent CPU-bound predictions
    permits: Arc<Semaphore>,
}

impl<E: VisualEncoder> AppState<E> {
    pub fn new(service: PredictionService<E>, metrics: Arc<ServiceMetrics>, workers: usize) -> Self {
        Self {
            service: Arc::new(service),
            metrics,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }
}

/// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    Prediction(PredictionError),
    Multipart(MultipartError),
    Rejected(MultipartRejection),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Prediction(err) => {
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Multipart(err) => err.status(),
            ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Prediction(err) => err.kind(),
            ApiError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            ApiError::Multipart(_) | ApiError::Rejected(_) => "bad_request",
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Prediction(err) => ErrorBody::from(err),
            ApiError::Multipart(err) => ErrorBody {
                error: format!("invalid multipart body: {}", err.body_text()),
                kind: self.kind().to_string(),
            },
            ApiError::Rejected(rejection) => ErrorBody {
                error: format!("expected a multipart form: {}", rejection.body_text()),
                kind: self.kind().to_string(),
            },
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        ApiError::Prediction(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Build the router with every route and the upload size limit.
pub fn build_router<E: VisualEncoder + 'static>(
    state: Arc<AppState<E>>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/predict/", post(predict_handler::<E>))
        .route("/predict", post(predict_handler::<E>))
        .route("/health", get(health_handler::<E>))
        .route("/metrics", get(metrics_handler::<E>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn predict_handler<E: VisualEncoder + 'static>(
    State(state): State<Arc<AppState<E>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let result = predict(&state, multipart)
        .instrument(info_span!("predict", %request_id))
        .await;
    let latency = start.elapsed();

    match result {
        Ok(response) => {
            state.metrics.record_success(latency, response.predicted_score);
            info!(
                %request_id,
                predicted_score = response.predicted_score,
                latency_us = latency.as_micros() as u64,
                "Prediction served"
            );
            Json(response).into_response()
        }
        Err(err) => {
            state.metrics.record_failure(latency, err.kind());
            if err.status().is_server_error() {
                error!(%request_id, error = ?err, "Prediction failed");
            } else {
                warn!(%request_id, kind = err.kind(), status = err.status().as_u16(), "Prediction rejected");
            }
            err.into_response()
        }
    }
}

async fn predict<E: VisualEncoder + 'static>(
    state: &AppState<E>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResponse, ApiError> {
    let request = read_request(multipart.map_err(ApiError::Rejected)?).await?;

    let permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| PredictionError::Inference(format!("worker pool closed: {}", e)))?;

    // The blocking task owns the permit, so a cancelled request keeps its
    // worker slot until the prediction actually finishes.
    let service = state.service.clone();
    let response = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        service.handle(&request)
    })
    .await
    .map_err(|e| PredictionError::Inference(format!("prediction task failed: {}", e)))??;

    Ok(response)
}

/// Collect the `image` and `features` fields; other fields are skipped.
async fn read_request(mut multipart: Multipart) -> Result<PredictionRequest, MultipartError> {
    let mut request = PredictionRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => request.image = Some(field.bytes().await?.to_vec()),
            "features" => request.features = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(request)
}

async fn health_handler<E: VisualEncoder + 'static>(
    State(state): State<Arc<AppState<E>>>,
) -> Json<HealthResponse> {
    let model = state.service.context().model();
    Json(HealthResponse {
        status: "ok".to_string(),
        embedding_dim: model.embedding_dim(),
        hidden_width: model.hidden_width(),
        features: TabularFeature::ALL.iter().map(|f| f.name().to_string()).collect(),
    })
}

async fn metrics_handler<E: VisualEncoder + 'static>(
    State(state): State<Arc<AppState<E>>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
