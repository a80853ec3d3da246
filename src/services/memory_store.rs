//! In-process cache store with expiry and LFU eviction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::CacheError;
use crate::traits::CacheStore;

struct Entry {
    value: String,
    expires_at: Instant,
    hits: u64,
}

/// A thread-safe, size-bounded key/value store with per-key expiry.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    max_size: usize,
}

impl MemoryStore {
    /// Create a store holding at most `max_size` live entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_size: max_size.max(1),
        }
    }

    /// Number of entries physically present, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make room for one insert: expired entries first, then the least
    /// frequently used one.
    fn evict(entries: &mut HashMap<String, Entry>, max_size: usize, now: Instant) {
        entries.retain(|_, entry| entry.expires_at > now);
        if entries.len() < max_size {
            return;
        }
        if let Some(lfu_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.hits)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&lfu_key);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.hits += 1;
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(key) && entries.len() >= self.max_size {
            Self::evict(&mut entries, self.max_size, now);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
                hits: 1,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_store_basic_operations() {
        let store = MemoryStore::new(2);

        store.set_ex("predict:a", "[1.0]", HOUR).await.unwrap();
        store.set_ex("predict:b", "[2.0]", HOUR).await.unwrap();

        assert_eq!(store.get("predict:a").await.unwrap().as_deref(), Some("[1.0]"));
        assert_eq!(store.get("predict:b").await.unwrap().as_deref(), Some("[2.0]"));
        assert_eq!(store.get("predict:c").await.unwrap(), None);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = MemoryStore::new(8);

        store
            .set_ex("predict:short", "[1.0]", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(store.get("predict:short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("predict:short").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lfu_eviction() {
        let store = MemoryStore::new(2);

        store.set_ex("a", "1", HOUR).await.unwrap();
        store.set_ex("b", "2", HOUR).await.unwrap();

        // Access "a" to increase its count
        store.get("a").await.unwrap();
        store.get("a").await.unwrap();

        // Insert "c", should evict "b" (lower access count)
        store.set_ex("c", "3", HOUR).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_evicted_before_live_ones() {
        let store = MemoryStore::new(2);

        store.set_ex("stale", "1", Duration::from_millis(10)).await.unwrap();
        store.set_ex("live", "2", HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.set_ex("new", "3", HOUR).await.unwrap();

        assert!(store.get("live").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_expiry() {
        let store = MemoryStore::new(1);

        store.set_ex("k", "old", Duration::from_millis(10)).await.unwrap();
        store.set_ex("k", "new", HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }
}
