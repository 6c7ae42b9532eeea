//! Stateless worker node.
//!
//! A worker answers one task per connection using only what the task carries.
//! Computation runs on the blocking pool so a large matrix never stalls the
//! accept loop.

use std::sync::Arc;
use async_trait::async_trait;

use crate::config::WorkerConfig;
use crate::errors::{ClusterError, ClusterResult};
use crate::similarity_search::SimilaritySearch;
use crate::task_server::{TaskHandler, TaskServer};
use crate::types::{CoordinatorResponse, TaskKind, TaskMessage};

/// Task handler for worker nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerNode;

impl WorkerNode {
    /// Bind a worker server with `config`
    pub async fn serve(config: &WorkerConfig) -> ClusterResult<TaskServer> {
        TaskServer::bind(&config.bind_addr, config.limits, Arc::new(WorkerNode)).await
    }

    /// Synchronously compute the response for `task`
    pub fn compute(task: &TaskMessage) -> ClusterResult<CoordinatorResponse> {
        match task.kind {
            TaskKind::Recommendation => {
                let sims = SimilaritySearch::similarity_for_user(&task.matrix, task.user_index)?;
                let predictions = SimilaritySearch::predict_ratings(&task.matrix, &sims, task.user_index, task.k)?;
                let indexes = SimilaritySearch::rank_by_score(&predictions);

                Ok(CoordinatorResponse {
                    result: predictions,
                    indexes: Some(indexes),
                })
            }
            TaskKind::Similarity => Ok(CoordinatorResponse {
                result: SimilaritySearch::similarity_matrix(&task.matrix),
                indexes: None,
            }),
            TaskKind::Unsupported => Err(ClusterError::UnknownTaskKind {
                kind: task.kind.to_string(),
            }),
        }
    }
}

#[async_trait]
impl TaskHandler for WorkerNode {
    fn role(&self) -> &'static str {
        "worker"
    }

    async fn handle(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        tokio::task::spawn_blocking(move || Self::compute(&task))
            .await
            .map_err(|e| ClusterError::Io {
                message: format!("Compute task failed: {}", e),
            })?
    }
}
