//! Error types for the gateway.
//!
//! `GatewayError` is the request-level taxonomy surfaced to callers.
//! `CacheError` covers the shared store and never leaves the cache layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Errors surfaced by the inference service.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Rate limit exceeded for client {client}")]
    RateLimitExceeded { client: String },
    #[error("Batch of {size} texts exceeds the maximum of {max}")]
    BatchSizeExceeded { size: usize, max: usize },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BatchSizeExceeded { .. } | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::BatchSizeExceeded { .. } => "BATCH_SIZE_EXCEEDED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::Inference(_) => "INFERENCE_FAILED",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Failures talking to the shared cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}
