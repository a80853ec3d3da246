//! HTTP handlers module.
//!
//! Provides the gateway's HTTP endpoints. The client's IP address is the
//! rate-limit identity.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::GatewayError;
use crate::models::{
    BatchPredictRequest, BatchPredictResponse, HealthResponse, PredictRequest, PredictResponse,
    ServiceInfo,
};
use crate::services::InferenceService;

/// Application state shared across handlers.
pub struct AppState {
    pub service: Arc<InferenceService>,
}

const ENDPOINTS: [&str; 4] = ["/", "/health", "/predict", "/batch_predict"];

/// Build the gateway's routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/batch_predict", post(batch_predict))
        .with_state(state)
}

/// Service banner.
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Embedding gateway is live".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.service.health().await)
}

/// Embed a single text.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, GatewayError> {
    let client = addr.ip().to_string();
    let Json(request) =
        parse_body(&state, &client, payload).map_err(|e| log_failure("Embedding", e))?;
    info!("Embedding single text for {}", client);

    state
        .service
        .predict_one(&client, &request.text)
        .await
        .map(Json)
        .map_err(|e| log_failure("Embedding", e))
}

/// Embed multiple texts in batch.
pub async fn batch_predict(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchPredictResponse>, GatewayError> {
    let client = addr.ip().to_string();
    let Json(request) =
        parse_body(&state, &client, payload).map_err(|e| log_failure("Batch embedding", e))?;
    info!(
        "Embedding batch of {} texts for {} (max {})",
        request.texts.len(),
        client,
        state.service.settings().max_batch_size
    );

    state
        .service
        .predict_batch(&client, &request.texts)
        .await
        .map(Json)
        .map_err(|e| log_failure("Batch embedding", e))
}

/// Unreadable bodies still count against the client's rate limit.
fn parse_body<T>(
    state: &AppState,
    client: &str,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<Json<T>, GatewayError> {
    payload.or_else(|rejection| {
        state.service.admit(client)?;
        Err(GatewayError::InvalidInput(rejection.body_text()))
    })
}

fn log_failure(what: &str, e: GatewayError) -> GatewayError {
    match &e {
        GatewayError::ModelUnavailable(_) | GatewayError::Inference(_) => {
            error!("{} failed: {}", what, e)
        }
        _ => warn!("{} rejected: {}", what, e),
    }
    e
}
