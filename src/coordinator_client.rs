//! Service-side client for the coordinator.

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::errors::{ClusterError, ClusterResult};
use crate::protocol::{self, ExchangeOptions};
use crate::types::{RatingMatrix, TaskKind, TaskMessageRef};

/// Source of ranked item indices for a user
///
/// The recommendation service depends on this seam rather than on a concrete
/// TCP client, so tests can count and script coordinator calls.
#[async_trait]
pub trait RecommendationBackend: Send + Sync {
    /// Item indices ordered by descending predicted score. `k` is the
    /// neighbour count for the KNN computation.
    async fn request_recommendations(
        &self,
        user_index: usize,
        matrix: &RatingMatrix,
        k: usize,
    ) -> ClusterResult<Vec<usize>>;
}

/// TCP client speaking the cluster protocol to one coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    addr: String,
    options: ExchangeOptions,
}

impl CoordinatorClient {
    pub fn new(addr: impl Into<String>, options: ExchangeOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.coordinator_addr.clone(),
            ExchangeOptions {
                connect_timeout: std::time::Duration::from_millis(config.connect_timeout_ms),
                io_timeout: std::time::Duration::from_millis(config.read_timeout_ms),
                ..ExchangeOptions::default()
            },
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Flattened U x U similarity matrix computed by the coordinator
    pub async fn request_similarity(&self, matrix: &RatingMatrix) -> ClusterResult<Vec<f64>> {
        let task = TaskMessageRef {
            kind: TaskKind::Similarity,
            matrix,
            user_index: 0,
            k: 0,
        };
        let response = protocol::send_task(&self.addr, &task, &self.options).await?;
        Ok(response.result)
    }
}

#[async_trait]
impl RecommendationBackend for CoordinatorClient {
    async fn request_recommendations(
        &self,
        user_index: usize,
        matrix: &RatingMatrix,
        k: usize,
    ) -> ClusterResult<Vec<usize>> {
        let task = TaskMessageRef {
            kind: TaskKind::Recommendation,
            matrix,
            user_index,
            k,
        };

        let response = protocol::send_task(&self.addr, &task, &self.options).await?;
        response.indexes.ok_or_else(|| ClusterError::MalformedResponse {
            addr: self.addr.clone(),
            reason: "recommendation response without indexes".to_string(),
        })
    }
}
