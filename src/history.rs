//! Recommendation history and catalogue listings.
//!
//! [`HistoryStore`] is the persistence contract: an append-only log of served
//! recommendations plus paginated listings of users and items. The in-memory
//! implementation is seeded from the dataset at startup.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ClusterResult;
use crate::performance::RequestMetrics;
use crate::types::ItemRecord;

/// One served recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub genre: String,
    pub limit: usize,
    pub items: Vec<ItemRecord>,
    pub metrics: RequestMetrics,
}

impl HistoryRecord {
    pub fn new(user_id: &str, genre: &str, limit: usize, items: Vec<ItemRecord>, metrics: RequestMetrics) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            genre: genre.to_string(),
            limit,
            items,
            metrics,
        }
    }
}

/// Persistent store behind the recommendation service
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> ClusterResult<()>;

    /// External user identifiers, `page` is 1-based
    async fn list_users(&self, page: usize, limit: usize) -> ClusterResult<Vec<String>>;

    /// Items whose genre contains `genre` (case-insensitive), `page` is 1-based
    async fn list_items(&self, genre: &str, page: usize, limit: usize) -> ClusterResult<Vec<ItemRecord>>;
}

/// Offset of a 1-based page; page 0 is treated as page 1
pub fn page_offset(page: usize, limit: usize) -> usize {
    page.saturating_sub(1).saturating_mul(limit)
}

/// In-process store seeded with the catalogue
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    users: Arc<Vec<String>>,
    items: Arc<Vec<ItemRecord>>,
    records: Arc<RwLock<Vec<HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn seeded(users: Vec<String>, items: Vec<ItemRecord>) -> Self {
        Self {
            users: Arc::new(users),
            items: Arc::new(items),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.records.read().await.clone()
    }

    pub async fn records_for_user(&self, user_id: &str) -> Vec<HistoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> ClusterResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_users(&self, page: usize, limit: usize) -> ClusterResult<Vec<String>> {
        Ok(self
            .users
            .iter()
            .skip(page_offset(page, limit))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_items(&self, genre: &str, page: usize, limit: usize) -> ClusterResult<Vec<ItemRecord>> {
        let needle = genre.trim().to_lowercase();
        Ok(self
            .items
            .iter()
            .filter(|item| item.matches_genre(&needle))
            .skip(page_offset(page, limit))
            .take(limit)
            .cloned()
            .collect())
    }
}
