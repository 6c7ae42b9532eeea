//! # Recommendation Cache
//!
//! Read-through cache contract used by the recommendation service, plus an
//! in-process LRU implementation with per-entry time-to-live. Finished item
//! lists and the metrics of the request that produced them are stored side by
//! side, the latter under [`metrics_key`].
//!
//! Callers treat every cache failure as non-fatal: a failed read is a miss
//! and a failed write is ignored.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::ClusterResult;
use crate::performance::RequestMetrics;
use crate::types::ItemRecord;

/// Key-value cache for finished recommendation lists
#[async_trait]
pub trait RecommendationCache: Send + Sync {
    /// `Ok(None)` on a miss or an expired entry
    async fn get(&self, key: &str) -> ClusterResult<Option<Vec<ItemRecord>>>;

    async fn set(&self, key: &str, items: &[ItemRecord], ttl: Duration) -> ClusterResult<()>;

    async fn get_metrics(&self, key: &str) -> ClusterResult<Option<RequestMetrics>>;

    async fn set_metrics(&self, key: &str, metrics: &RequestMetrics, ttl: Duration) -> ClusterResult<()>;
}

/// Cache key for a recommendation request; `genre` must already be normalized
pub fn recommendation_key(user_id: &str, genre: &str, limit: usize) -> String {
    format!("rec:{}:{}:{}", user_id, genre, limit)
}

/// Key under which the metrics for `cache_key` are stored
pub fn metrics_key(cache_key: &str) -> String {
    format!("{}:metrics", cache_key)
}

#[derive(Debug, Clone)]
enum CachedValue {
    Items(Vec<ItemRecord>),
    Metrics(RequestMetrics),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub expirations: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-process LRU cache with TTL expiry
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<LruCache<String, CacheEntry>>>,
    metrics: Arc<RwLock<CacheMetrics>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            metrics: Arc::new(RwLock::new(CacheMetrics::default())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn metrics(&self) -> CacheMetrics {
        self.metrics.read().await.clone()
    }
}

impl InMemoryCache {
    async fn lookup(&self, key: &str) -> Option<CachedValue> {
        // LRU lookups reorder entries, so even reads take the write lock
        let mut entries = self.entries.write().await;
        let mut metrics = self.metrics.write().await;

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                metrics.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            metrics.expirations += 1;
        }
        metrics.misses += 1;
        None
    }

    async fn store(&self, key: &str, value: CachedValue, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.put(key.to_string(), entry);
        self.metrics.write().await.insertions += 1;
    }
}

#[async_trait]
impl RecommendationCache for InMemoryCache {
    async fn get(&self, key: &str) -> ClusterResult<Option<Vec<ItemRecord>>> {
        Ok(match self.lookup(key).await {
            Some(CachedValue::Items(items)) => Some(items),
            _ => None,
        })
    }

    async fn set(&self, key: &str, items: &[ItemRecord], ttl: Duration) -> ClusterResult<()> {
        self.store(key, CachedValue::Items(items.to_vec()), ttl).await;
        Ok(())
    }

    async fn get_metrics(&self, key: &str) -> ClusterResult<Option<RequestMetrics>> {
        Ok(match self.lookup(key).await {
            Some(CachedValue::Metrics(metrics)) => Some(metrics),
            _ => None,
        })
    }

    async fn set_metrics(&self, key: &str, metrics: &RequestMetrics, ttl: Duration) -> ClusterResult<()> {
        self.store(key, CachedValue::Metrics(metrics.clone()), ttl).await;
        Ok(())
    }
}
