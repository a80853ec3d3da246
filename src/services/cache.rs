//! Cache-aside layer over a shared key/value store.
//!
//! Store failures never fail a request: a failed read counts as a miss and a
//! failed write is logged and dropped. Concurrent misses on the same key may
//! both run the producer and both write; the producer is expected to be
//! deterministic for a given input, so the overwrite is harmless.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::CacheStore;

/// Cache-aside wrapper keyed by a hash of the normalized request content.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Lower-case and trim so equivalent queries share a key.
    pub fn normalize(seed: &str) -> String {
        seed.trim().to_lowercase()
    }

    /// Generate a cache key: `<namespace>:<hex sha256 of normalized seed>`.
    pub fn generate_key(namespace: &str, seed: &str) -> String {
        let digest = Sha256::digest(Self::normalize(seed).as_bytes());
        format!("{}:{:x}", namespace, digest)
    }

    /// Return the cached value for `seed`, or run `producer` and cache its
    /// result for `ttl`. Producer errors propagate and are not cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: &str,
        seed: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = Self::generate_key(namespace, seed);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("Cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => warn!("Discarding undecodable cache entry {}: {}", key, e),
            },
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache read failed, computing directly: {}", e),
        }

        let value = producer().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.set_ex(&key, &raw, ttl).await {
                    warn!("Cache write dropped for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Could not serialize value for {}: {}", key, e),
        }

        Ok(value)
    }

    /// Whether the backing store answers a ping.
    pub async fn is_connected(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Cache ping failed: {}", e);
                false
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }
}
