//! API models for request/response types.
//!
//! Defines the JSON request/response structures for the gateway API.

use serde::{Deserialize, Serialize};

/// Request for embedding a single text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// The text to embed. A missing field is treated as empty.
    #[serde(default)]
    pub text: String,
}

/// Response for a single embedding. Also the cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// The embedding vector.
    pub embeddings: Vec<f32>,
}

/// Request for batch embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    /// The texts to embed, in order.
    #[serde(default)]
    pub texts: Vec<String>,
}

/// Response for batch embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    /// One embedding per input text, in input order.
    pub embeddings: Vec<Vec<f32>>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" when the model is loaded, "degraded" otherwise.
    pub status: String,
    pub accelerator_available: bool,
    pub model_loaded: bool,
    pub cache_connected: bool,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Model name.
    pub model: String,
    /// Embedding dimension.
    pub dimension: usize,
    /// Cache store backend ("redis" or "memory").
    pub cache_backend: String,
}

/// Banner returned by the root endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
