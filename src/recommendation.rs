//! # Recommendation Service
//!
//! Consumer-facing layer over the cluster. For one request it:
//!
//! 1. maps the external user identifier to a matrix row, failing fast with
//!    [`ClusterError::UserNotFound`] before any network call;
//! 2. consults the cache under `rec:{user}:{genre}:{limit}`, returning a hit
//!    without calling the coordinator or writing history;
//! 3. asks the coordinator for ranked item indices, passing the requested
//!    result count as the KNN neighbour count;
//! 4. maps indices back to item records, applies the optional genre filter
//!    and stops once `limit` items are accepted. Filtered-out candidates are
//!    not backfilled, so the list may be shorter than requested;
//! 5. caches the result together with the request metrics and records
//!    history in the background.
//!
//! Only step 3 can fail the request once the user is known. Cache and history
//! failures are logged and dropped through [`best_effort`].

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::{metrics_key, recommendation_key, RecommendationCache};
use crate::coordinator_client::RecommendationBackend;
use crate::dataset::Dataset;
use crate::errors::{best_effort, ClusterError, ClusterResult};
use crate::history::{HistoryRecord, HistoryStore};
use crate::performance::{RequestMetrics, RequestTracker};
use crate::types::ItemRecord;

/// Items served for one request and the metrics of the computation behind them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub items: Vec<ItemRecord>,
    /// `None` on a cache hit whose metrics have expired or were never stored
    pub metrics: Option<RequestMetrics>,
}

pub struct RecommendationService {
    dataset: Arc<Dataset>,
    backend: Arc<dyn RecommendationBackend>,
    cache: Arc<dyn RecommendationCache>,
    history: Arc<dyn HistoryStore>,
    cache_ttl: Duration,
}

impl RecommendationService {
    pub fn new(
        dataset: Arc<Dataset>,
        backend: Arc<dyn RecommendationBackend>,
        cache: Arc<dyn RecommendationCache>,
        history: Arc<dyn HistoryStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            dataset,
            backend,
            cache,
            history,
            cache_ttl,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Up to `limit` recommended items for `user_id`, optionally restricted to
    /// items whose genre contains `genre` (case-insensitive).
    ///
    /// A `limit` of zero is rejected with [`ClusterError::MalformedTask`]
    /// instead of being treated as a request for a single item.
    pub async fn recommend(&self, user_id: &str, limit: usize, genre: &str) -> ClusterResult<Recommendation> {
        let user_index = self
            .dataset
            .mappings()
            .user_index(user_id)
            .ok_or_else(|| ClusterError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        if limit == 0 {
            return Err(ClusterError::MalformedTask {
                reason: "limit must be greater than zero".to_string(),
            });
        }

        let genre = normalize_genre(genre);
        let cache_key = recommendation_key(user_id, &genre, limit);

        match self.cache.get(&cache_key).await {
            Ok(Some(items)) => {
                log::debug!("Cache hit for {}", cache_key);
                let metrics = match self.cache.get_metrics(&metrics_key(&cache_key)).await {
                    Ok(metrics) => metrics,
                    Err(e) => {
                        log::warn!("Metrics read failed for {}: {}", cache_key, e);
                        None
                    }
                };
                return Ok(Recommendation { items, metrics });
            }
            Ok(None) => log::debug!("Cache miss for {}", cache_key),
            Err(e) => log::warn!("Cache read failed for {}, treating as miss: {}", cache_key, e),
        }

        let tracker = RequestTracker::start("recommend");
        // The requested count doubles as the neighbour count k
        let candidates = self
            .backend
            .request_recommendations(user_index, self.dataset.matrix(), limit)
            .await?;

        let items = self.select_items(&candidates, &genre, limit);
        let metrics = tracker.finish(candidates.len(), items.len());

        best_effort(
            "cache write",
            self.cache.set(&cache_key, &items, self.cache_ttl).await,
        );
        best_effort(
            "metrics cache write",
            self.cache
                .set_metrics(&metrics_key(&cache_key), &metrics, self.cache_ttl)
                .await,
        );
        self.record_history(HistoryRecord::new(user_id, &genre, limit, items.clone(), metrics.clone()));

        Ok(Recommendation {
            items,
            metrics: Some(metrics),
        })
    }

    /// Map ranked indices to catalogue records, filter and cap at `limit`
    fn select_items(&self, candidates: &[usize], genre: &str, limit: usize) -> Vec<ItemRecord> {
        candidates
            .iter()
            .filter_map(|&index| self.dataset.item_at(index))
            .filter(|item| item.matches_genre(genre))
            .take(limit)
            .cloned()
            .collect()
    }

    fn record_history(&self, record: HistoryRecord) {
        let history = self.history.clone();
        tokio::spawn(async move {
            best_effort("history append", history.append(record).await);
        });
    }

    pub async fn list_users(&self, page: usize, limit: usize) -> ClusterResult<Vec<String>> {
        self.history.list_users(page, limit).await
    }

    pub async fn list_items(&self, genre: &str, page: usize, limit: usize) -> ClusterResult<Vec<ItemRecord>> {
        self.history.list_items(&normalize_genre(genre), page, limit).await
    }

    pub fn genres(&self) -> &[String] {
        self.dataset.genres()
    }
}

/// Trimmed lowercase genre filter; empty means "no filter"
pub fn normalize_genre(genre: &str) -> String {
    genre.trim().to_lowercase()
}
