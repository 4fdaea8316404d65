//! HTTP API.
//!
//! Routes:
//!
//! - `POST /predict`        one feature vector -> `{"prediction": n}`
//! - `POST /predict/batch`  several vectors -> `{"predictions": [..]}`
//! - `GET  /health`         readiness (always ready once serving)
//! - `GET  /model`          loaded artifact metadata
//! - `GET  /stats`          request metrics

use crate::config::ServerConfig;
use crate::error::PredictError;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::models::{InferenceEngine, ModelInfo};
use crate::shutdown::shutdown_signal;
use crate::types::{
    BatchPredictRequest, BatchPredictResponse, ErrorBody, HealthResponse, PredictRequest,
    PredictResponse,
};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Shared state handed to every handler.
///
/// Can only be built from a loaded engine, so no request is ever served
/// before the model is ready.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<InferenceEngine>,
    metrics: Arc<ServiceMetrics>,
    /// Bounds how many predictions run on the blocking pool at once
    permits: Arc<Semaphore>,
    max_batch_size: usize,
}

impl AppState {
    pub fn new(engine: Arc<InferenceEngine>, metrics: Arc<ServiceMetrics>, config: &ServerConfig) -> Self {
        Self {
            engine,
            metrics,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            max_batch_size: config.max_batch_size,
        }
    }

    /// Run `f` against the engine on the blocking pool, holding a worker permit
    async fn run_inference<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&InferenceEngine) -> Result<T, PredictError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Worker("worker pool closed".to_string()))?;

        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| ApiError::Worker(e.to_string()))?
            .map_err(ApiError::Predict)
    }
}

/// Build the router with all routes and limits applied
pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(handle_predict))
        .route("/predict/batch", post(handle_predict_batch))
        .route("/health", get(health_check))
        .route("/model", get(model_info))
        .route("/stats", get(stats))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

/// Bind and serve until a shutdown signal arrives
pub async fn serve(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let app = router(state, config.max_request_bytes);
    let addr = config.bind_addr();

    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, workers = config.workers, "Prediction service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Prediction service stopped");
    Ok(())
}

/// Request failure as seen by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    /// Body could not be parsed into the request schema
    Rejected(JsonRejection),
    /// The engine refused or failed the request
    Predict(PredictError),
    /// The blocking task panicked or the pool is gone
    Worker(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(rejection) => rejection.status(),
            ApiError::Predict(e) => match e {
                _ if !e.is_client_error() => StatusCode::INTERNAL_SERVER_ERROR,
                PredictError::NonFiniteFeature { .. }
                | PredictError::EmptyBatch
                | PredictError::BatchTooLarge { .. } => StatusCode::BAD_REQUEST,
                PredictError::Instance { source, .. } => {
                    ApiError::Predict((**source).clone()).status()
                }
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Rejected(_) => "invalid_request",
            ApiError::Predict(e) => e.kind(),
            ApiError::Worker(_) => "worker_failed",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Rejected(rejection) => rejection.body_text(),
            ApiError::Predict(e) => e.to_string(),
            ApiError::Worker(reason) => format!("prediction worker failed: {}", reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// Handlers

async fn handle_predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let start = Instant::now();

    let result = match payload {
        Ok(Json(request)) => {
            state
                .run_inference(move |engine| engine.predict_input(&request.features))
                .await
        }
        Err(rejection) => Err(ApiError::Rejected(rejection)),
    };

    match result {
        Ok(prediction) => {
            state.metrics.record_success(start.elapsed(), &[prediction]);
            debug!(prediction, latency_us = start.elapsed().as_micros(), "Prediction served");
            Ok(Json(PredictResponse { prediction }))
        }
        Err(e) => Err(record_failure(&state, start, e)),
    }
}

async fn handle_predict_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchPredictResponse>, ApiError> {
    let start = Instant::now();
    let max_batch_size = state.max_batch_size;

    let result = match payload {
        Ok(Json(request)) => {
            state
                .run_inference(move |engine| engine.predict_batch(&request.instances, max_batch_size))
                .await
        }
        Err(rejection) => Err(ApiError::Rejected(rejection)),
    };

    match result {
        Ok(predictions) => {
            state.metrics.record_success(start.elapsed(), &predictions);
            debug!(
                rows = predictions.len(),
                latency_us = start.elapsed().as_micros(),
                "Batch prediction served"
            );
            Ok(Json(BatchPredictResponse { predictions }))
        }
        Err(e) => Err(record_failure(&state, start, e)),
    }
}

fn record_failure(state: &AppState, start: Instant, e: ApiError) -> ApiError {
    state.metrics.record_failure(start.elapsed(), e.kind());
    let status = e.status();
    if status.is_server_error() {
        error!(kind = e.kind(), error = %e.message(), "Prediction failed");
    } else {
        warn!(kind = e.kind(), status = status.as_u16(), error = %e.message(), "Prediction rejected");
    }
    e
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready".to_string(),
        model_format: state.engine.info().format.as_str().to_string(),
        uptime_secs: state.metrics.snapshot().uptime_secs,
    })
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.engine.info().clone())
}

async fn stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
