//! Core traits at the seams between the gateway's components.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::error::{CacheError, GatewayError};

/// Something that turns text into fixed-size embedding vectors.
///
/// Implemented by [`crate::services::ModelRuntime`]; tests substitute
/// counting fakes.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn predict_one(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Generate embeddings for multiple texts, preserving input order.
    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Whether the underlying model has been initialized successfully.
    fn is_loaded(&self) -> bool;

    /// Whether an accelerator was detected at startup.
    fn accelerator_available(&self) -> bool;
}

/// A loaded model that runs blocking forward passes.
pub trait InferenceEngine: Send + Sync {
    /// Embed a batch of texts. Called from the blocking thread pool.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Shared key/value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value. `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Round-trip check used by the health endpoint.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &str;
}
