//! Inference service.
//!
//! Composes the rate limiter, the response cache and the model runtime.
//! Every request is admitted by the limiter before any validation, cache or
//! model work happens.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::clients::{probe_accelerator, RedisStore};
use crate::config::{CacheBackend, Config};
use crate::error::GatewayError;
use crate::models::{BatchPredictResponse, HealthResponse, PredictResponse};
use crate::services::{MemoryStore, ModelRuntime, RateLimiter, ResponseCache};
use crate::traits::{CacheStore, Embedder};

/// Cache namespace for single predictions.
pub const PREDICT_NAMESPACE: &str = "predict";

/// Tunables for the service itself.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub model_name: String,
    pub cache_ttl: Duration,
    pub max_batch_size: usize,
    pub rate_limit_per_second: usize,
}

/// The gateway: owns all component state and is shared across handlers.
pub struct InferenceService {
    limiter: RateLimiter,
    cache: ResponseCache,
    runtime: Arc<dyn Embedder>,
    settings: ServiceSettings,
}

impl InferenceService {
    pub fn new(
        settings: ServiceSettings,
        runtime: Arc<dyn Embedder>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(settings.rate_limit_per_second),
            cache: ResponseCache::new(store),
            runtime,
            settings,
        }
    }

    /// Build the production service: ONNX runtime plus the configured store.
    pub async fn from_config(config: &Config) -> Result<Self> {
        info!("Initializing inference service");

        let accelerator = probe_accelerator(config.use_cuda);
        let runtime = Arc::new(ModelRuntime::new(config.to_runtime_config(), accelerator));

        if config.eager_model_load {
            // A failure here is memoized; requests will answer 503.
            if let Err(e) = runtime.initialize().await {
                error!("Serving without a model: {}", e);
            }
        }

        let store: Arc<dyn CacheStore> = match config.cache_backend {
            CacheBackend::Redis => {
                info!("Cache backend: redis at {}:{}", config.redis_host, config.redis_port);
                Arc::new(RedisStore::new(&config.redis_url(), config.redis_timeout)?)
            }
            CacheBackend::Memory => {
                info!("Cache backend: in-process ({} entries)", config.cache_size);
                Arc::new(MemoryStore::new(config.cache_size))
            }
        };

        Ok(Self::new(config.service_settings(), runtime, store))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Charge one request to `client_id`, or reject it.
    pub fn admit(&self, client_id: &str) -> Result<(), GatewayError> {
        if self.limiter.admit(client_id) {
            Ok(())
        } else {
            Err(GatewayError::RateLimitExceeded {
                client: client_id.to_string(),
            })
        }
    }

    /// Embed one text, served from the cache when possible.
    pub async fn predict_one(
        &self,
        client_id: &str,
        text: &str,
    ) -> Result<PredictResponse, GatewayError> {
        self.admit(client_id)?;

        if text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("text must not be empty".to_string()));
        }

        let runtime = &self.runtime;
        self.cache
            .get_or_compute(PREDICT_NAMESPACE, text, self.settings.cache_ttl, || async move {
                let embeddings = runtime.predict_one(text).await?;
                Ok::<_, GatewayError>(PredictResponse { embeddings })
            })
            .await
    }

    /// Embed a batch directly; batches are never cached.
    pub async fn predict_batch(
        &self,
        client_id: &str,
        texts: &[String],
    ) -> Result<BatchPredictResponse, GatewayError> {
        self.admit(client_id)?;

        if texts.len() > self.settings.max_batch_size {
            return Err(GatewayError::BatchSizeExceeded {
                size: texts.len(),
                max: self.settings.max_batch_size,
            });
        }
        if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(GatewayError::InvalidInput(format!(
                "text at index {} must not be empty",
                index
            )));
        }
        if texts.is_empty() {
            return Ok(BatchPredictResponse { embeddings: vec![] });
        }

        debug!("Embedding batch of {} texts", texts.len());
        let embeddings = self.runtime.predict_batch(texts).await?;
        Ok(BatchPredictResponse { embeddings })
    }

    /// Snapshot of model, accelerator and cache state.
    pub async fn health(&self) -> HealthResponse {
        let model_loaded = self.runtime.is_loaded();
        HealthResponse {
            status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
            accelerator_available: self.runtime.accelerator_available(),
            model_loaded,
            cache_connected: self.cache.is_connected().await,
            service: "embedding-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: self.settings.model_name.clone(),
            dimension: self.runtime.dimension(),
            cache_backend: self.cache.backend_name().to_string(),
        }
    }
}
