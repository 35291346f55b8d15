use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_capacity: 10000,
        }
    }
}

impl CacheConfig {
    /// Configuration for finished risk assessments
    pub fn risk_assessments() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_capacity: 1000,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }
}

/// Persisted second cache layer. Keys arrive already namespaced.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError>;
    async fn clear_prefix(&self, prefix: &str) -> Result<(), AppError>;
}

/// Redis-backed `CacheStore`
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self, AppError> {
        let client = Client::open(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.client.get_async_connection().await?;
        let data: Option<Vec<u8>> = conn.get(key).await?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), AppError> {
        let mut conn = self.client.get_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
        }
        Ok(())
    }
}

/// Multi-layer cache with in-memory (L1) and optional persisted (L2) support.
/// L2 failures are logged and never surface to callers.
pub struct MultiLayerCache<T> {
    l1_cache: Cache<String, T>,
    l2_store: Option<Arc<dyn CacheStore>>,
    config: CacheConfig,
    cache_name: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> MultiLayerCache<T>
where
    T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    pub fn new(cache_name: &str, config: CacheConfig, l2_store: Option<Arc<dyn CacheStore>>) -> Self {
        let l1_cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .build();

        info!(
            "Multi-layer cache '{}' initialized (L1: {}, L2: {})",
            cache_name,
            "in-memory",
            l2_store.as_ref().map(|s| s.backend()).unwrap_or("disabled")
        );

        Self {
            l1_cache,
            l2_store,
            config,
            cache_name: cache_name.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn l2_key(&self, key: &str) -> String {
        format!("{}:{}", self.cache_name, key)
    }

    /// Get value from cache (checks L1 first, then L2)
    pub async fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.l1_cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(store) = &self.l2_store {
            match store.get(&self.l2_key(key)).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => {
                        self.l1_cache.insert(key.to_string(), value.clone()).await;
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(cache = %self.cache_name, key = %key, error = %e, "Discarding undecodable L2 entry");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(cache = %self.cache_name, key = %key, error = %e, "L2 get failed, bypassing");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Set value in cache (stores in both L1 and L2)
    pub async fn set(&self, key: &str, value: T) {
        if let Some(store) = &self.l2_store {
            match serde_json::to_vec(&value) {
                Ok(bytes) => {
                    if let Err(e) = store.set(&self.l2_key(key), bytes, self.config.ttl).await {
                        warn!(cache = %self.cache_name, key = %key, error = %e, "L2 set failed, bypassing");
                    }
                }
                Err(e) => {
                    warn!(cache = %self.cache_name, key = %key, error = %e, "Failed to encode cache entry");
                }
            }
        }

        self.l1_cache.insert(key.to_string(), value).await;
        debug!(cache = %self.cache_name, key = %key, "Cache entry stored");
    }

    /// Clear entire cache (both L1 and L2)
    pub async fn clear(&self) {
        self.l1_cache.invalidate_all();

        if let Some(store) = &self.l2_store {
            if let Err(e) = store.clear_prefix(&format!("{}:", self.cache_name)).await {
                warn!(cache = %self.cache_name, error = %e, "L2 clear failed");
            }
        }

        info!("Cache '{}' cleared", self.cache_name);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cache_name: self.cache_name.clone(),
            l1_entries: self.l1_cache.entry_count(),
            l2_available: self.l2_store.is_some(),
            ttl_seconds: self.config.ttl.as_secs(),
            max_capacity: self.config.max_capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cache_name: String,
    pub l1_entries: u64,
    pub l2_available: bool,
    pub ttl_seconds: u64,
    pub max_capacity: u64,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl CacheStore for MemoryStore {
        fn backend(&self) -> &'static str {
            "memory"
        }
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
            Ok(self.entries.lock().await.get(key).cloned())
        }
        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), AppError> {
            self.entries.lock().await.insert(key.to_string(), value);
            Ok(())
        }
        async fn clear_prefix(&self, prefix: &str) -> Result<(), AppError> {
            self.entries.lock().await.retain(|k, _| !k.starts_with(prefix));
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, AppError> {
            Err(AppError::CacheError("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), AppError> {
            Err(AppError::CacheError("connection refused".to_string()))
        }
        async fn clear_prefix(&self, _prefix: &str) -> Result<(), AppError> {
            Err(AppError::CacheError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = MultiLayerCache::<String>::new("test_cache", CacheConfig::default(), None);

        cache.set("test_key", "test_value".to_string()).await;
        assert_eq!(cache.get("test_key").await, Some("test_value".to_string()));

        cache.clear().await;
        assert_eq!(cache.get("test_key").await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(!stats.l2_available);
    }

    #[tokio::test]
    async fn test_l2_backfills_l1() {
        let store = Arc::new(MemoryStore::default());
        let writer = MultiLayerCache::<String>::new("shared", CacheConfig::default(), Some(store.clone()));
        writer.set("k", "v".to_string()).await;
        assert!(store.entries.lock().await.contains_key("shared:k"));

        // A fresh instance has an empty L1 and must read through to L2
        let reader = MultiLayerCache::<String>::new("shared", CacheConfig::default(), Some(store));
        assert_eq!(reader.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_broken_l2_is_bypassed() {
        let cache = MultiLayerCache::<String>::new("degraded", CacheConfig::default(), Some(Arc::new(BrokenStore)));
        cache.set("k", "v".to_string()).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
        assert_eq!(cache.get("missing").await, None);
        cache.clear().await;
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MultiLayerCache::<String>::new(
            "short",
            CacheConfig::default().with_ttl(Duration::from_millis(100)),
            None,
        );
        cache.set("k", "v".to_string()).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
