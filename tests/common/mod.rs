//! Shared fakes for the HTTP tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use embedding_gateway::handlers::{self, AppState};
use embedding_gateway::services::{
    Accelerator, InferenceService, MemoryStore, ModelRuntime, ServiceSettings, VectorOps,
};
use embedding_gateway::{CacheError, CacheStore, InferenceEngine};

pub const DIM: usize = 16;
pub const MAX_LENGTH: usize = 32;

/// Whitespace "tokenizer" with hashed token states, mean-pooled like the
/// real engine. Counts forward passes.
pub struct HashingEngine {
    pub calls: Arc<AtomicUsize>,
}

impl HashingEngine {
    fn token_state(token: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let h = hasher.finish();
        (0..DIM)
            .map(|i| (h.rotate_left(i as u32 * 4) & 0xff) as f32 / 255.0)
            .collect()
    }
}

impl InferenceEngine for HashingEngine {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let tokenized: Vec<Vec<&str>> = texts
            .iter()
            .map(|t| t.split_whitespace().take(MAX_LENGTH).collect())
            .collect();
        let seq_len = tokenized.iter().map(Vec::len).max().unwrap_or(0).max(1);

        let mut hidden = vec![0.0f32; texts.len() * seq_len * DIM];
        let mut mask = vec![0i64; texts.len() * seq_len];
        for (b, tokens) in tokenized.iter().enumerate() {
            for (t, token) in tokens.iter().enumerate() {
                let offset = (b * seq_len + t) * DIM;
                hidden[offset..offset + DIM].copy_from_slice(&Self::token_state(token));
                mask[b * seq_len + t] = 1;
            }
        }

        Ok(VectorOps::mean_pool(&hidden, &mask, texts.len(), seq_len, DIM))
    }
}

/// Store that refuses every operation.
pub struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn backend_name(&self) -> &str {
        "redis"
    }
}

pub struct TestGateway {
    pub app: Router,
    pub service: Arc<InferenceService>,
    pub forward_passes: Arc<AtomicUsize>,
}

pub struct GatewayOptions {
    pub batch_size: usize,
    pub rate_limit: usize,
    pub cache_ttl: Duration,
    pub store: Arc<dyn CacheStore>,
    pub model_fails: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            rate_limit: 1000,
            cache_ttl: Duration::from_secs(60),
            store: Arc::new(MemoryStore::new(1000)),
            model_fails: false,
        }
    }
}

pub fn gateway(options: GatewayOptions) -> TestGateway {
    let forward_passes = Arc::new(AtomicUsize::new(0));
    let calls = forward_passes.clone();
    let model_fails = options.model_fails;

    let runtime = Arc::new(ModelRuntime::with_loader(DIM, Accelerator::Unavailable, move || {
        if model_fails {
            anyhow::bail!("Model file not found: ./models/model.onnx");
        }
        Ok(Arc::new(HashingEngine {
            calls: calls.clone(),
        }) as Arc<dyn InferenceEngine>)
    }));

    let settings = ServiceSettings {
        model_name: "hashing-test".to_string(),
        cache_ttl: options.cache_ttl,
        max_batch_size: options.batch_size,
        rate_limit_per_second: options.rate_limit,
    };
    let service = Arc::new(InferenceService::new(settings, runtime, options.store));

    let state = Arc::new(AppState {
        service: service.clone(),
    });

    let app = handlers::router(state).layer(MockConnectInfo(SocketAddr::from(([1, 2, 3, 4], 4000))));

    TestGateway {
        app,
        service,
        forward_passes,
    }
}
