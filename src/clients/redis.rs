//! Redis-backed cache store.
//!
//! Connects lazily through a [`ConnectionManager`], which reconnects on its
//! own after the first successful connect. Every round-trip is bounded by
//! the configured timeout so an unreachable store reads as a miss quickly,
//! and a failed connect is not retried until [`RECONNECT_BACKOFF`] passes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::CacheError;
use crate::traits::CacheStore;

/// Minimum wait between failed connection attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Cache store backed by a shared Redis instance.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    last_failure: Mutex<Option<Instant>>,
    timeout: Duration,
}

impl RedisStore {
    /// Create a store for `url`. Does not connect until first use.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            last_failure: Mutex::new(None),
            timeout,
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if let Some(manager) = self.connection.get() {
            return Ok(manager.clone());
        }
        if let Some(remaining) = self.backoff_remaining() {
            return Err(CacheError::Unavailable(format!(
                "not reconnecting for another {:?}",
                remaining
            )));
        }

        let attempt = self
            .bounded(self.connection.get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("✓ Connected to Redis cache");
                Ok::<_, CacheError>(manager)
            }))
            .await;

        match attempt {
            Ok(manager) => Ok(manager.clone()),
            Err(e) => {
                warn!("Redis connect failed, retrying in {:?}: {}", RECONNECT_BACKOFF, e);
                if let Ok(mut last_failure) = self.last_failure.lock() {
                    *last_failure = Some(Instant::now());
                }
                Err(e)
            }
        }
    }

    fn backoff_remaining(&self) -> Option<Duration> {
        let last_failure = (*self.last_failure.lock().ok()?)?;
        RECONNECT_BACKOFF.checked_sub(last_failure.elapsed())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(async move {
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, CacheError>(value)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        self.bounded(async move {
            conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(async move {
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    fn backend_name(&self) -> &str {
        "redis"
    }
}
