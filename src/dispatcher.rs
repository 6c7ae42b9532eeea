//! Coordinator dispatch: local similarity, replicated recommendation.
//!
//! Recommendation tasks are replicated in full to every configured worker;
//! this is not sharding, each worker redoes the whole computation. The
//! responses that arrive are averaged elementwise over the number of workers
//! that actually responded, and the mean vector is re-ranked locally.
//!
//! A worker that cannot be reached, times out or returns a malformed payload
//! is logged and left out. It is not retried or re-dispatched. Only when no
//! worker responds does the request fail.

use std::sync::Arc;
use futures::future::join_all;

use crate::config::CoordinatorConfig;
use crate::errors::{ClusterError, ClusterResult};
use crate::protocol::{self, ExchangeOptions};
use crate::similarity_search::SimilaritySearch;
use crate::types::{CoordinatorResponse, TaskKind, TaskMessage};

/// Outcome of a single worker exchange
#[derive(Debug)]
pub struct WorkerOutcome {
    pub addr: String,
    pub result: ClusterResult<CoordinatorResponse>,
}

/// Fans recommendation tasks out to a fixed, read-only worker endpoint set
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: Arc<[String]>,
    options: ExchangeOptions,
}

impl Dispatcher {
    pub fn new(workers: Vec<String>, options: ExchangeOptions) -> Self {
        Self {
            workers: workers.into(),
            options,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(
            config.workers.clone(),
            ExchangeOptions {
                connect_timeout: config.connect_timeout(),
                io_timeout: config.worker_read_timeout(),
                max_response_bytes: config.limits.max_message_bytes,
            },
        )
    }

    /// Entry point for every task the coordinator receives
    pub async fn process(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        match task.kind {
            TaskKind::Similarity => self.process_similarity(task).await,
            TaskKind::Recommendation => self.process_recommendation(task).await,
            TaskKind::Unsupported => Err(ClusterError::UnknownTaskKind {
                kind: task.kind.to_string(),
            }),
        }
    }

    /// Similarity is computed locally, without fan-out
    async fn process_similarity(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        let result = tokio::task::spawn_blocking(move || SimilaritySearch::similarity_matrix(&task.matrix))
            .await
            .map_err(|e| ClusterError::Io {
                message: format!("Similarity task failed: {}", e),
            })?;

        Ok(CoordinatorResponse { result, indexes: None })
    }

    async fn process_recommendation(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        // Every worker would reject this task; fail before touching the network
        if task.user_index >= task.matrix.num_users() {
            return Err(ClusterError::MalformedTask {
                reason: format!(
                    "user index {} out of range ({} users)",
                    task.user_index,
                    task.matrix.num_users()
                ),
            });
        }

        log::info!(
            "Dispatching recommendation for user {} (k={}) to {} workers",
            task.user_index,
            task.k,
            self.workers.len()
        );

        let outcomes = self.fan_out(&task).await?;
        let response = aggregate(self.workers.len(), task.matrix.num_items(), outcomes)?;

        log::info!("Combined recommendations over {} items", response.result.len());
        Ok(response)
    }

    /// Send `task` to every worker concurrently and wait for all attempts
    pub async fn fan_out(&self, task: &TaskMessage) -> ClusterResult<Vec<WorkerOutcome>> {
        // Encode once; every worker receives identical bytes
        let payload = serde_json::to_vec(task)?;
        let payload = payload.as_slice();
        let options = &self.options;

        let attempts = self.workers.iter().map(|addr| async move {
            log::debug!("Sending task to worker {}", addr);
            WorkerOutcome {
                addr: addr.clone(),
                result: protocol::exchange(addr, payload, options).await,
            }
        });

        Ok(join_all(attempts).await)
    }
}

/// Elementwise mean of the successful worker responses.
///
/// `configured` is only used for logging and the failure message; the mean is
/// taken over responders. A response whose vector length differs from
/// `expected_len` counts as malformed.
pub fn aggregate(
    configured: usize,
    expected_len: usize,
    outcomes: Vec<WorkerOutcome>,
) -> ClusterResult<CoordinatorResponse> {
    let mut sum = vec![0.0_f64; expected_len];
    let mut responders = 0usize;

    for outcome in outcomes {
        match outcome.result {
            Ok(response) if response.result.len() == expected_len && expected_len > 0 => {
                log::debug!("Worker {} returned {} values", outcome.addr, response.result.len());
                for (acc, value) in sum.iter_mut().zip(&response.result) {
                    *acc += value;
                }
                responders += 1;
            }
            Ok(response) => {
                log::warn!(
                    "Worker {} returned {} values, expected {}; ignoring",
                    outcome.addr,
                    response.result.len(),
                    expected_len
                );
            }
            Err(e) => {
                log::warn!("Worker {} failed: {}", outcome.addr, e);
            }
        }
    }

    if responders == 0 {
        log::error!("No results received from any of {} workers", configured);
        return Err(ClusterError::NoWorkerResults { configured });
    }

    log::info!("Aggregating results from {}/{} workers", responders, configured);
    let mean: Vec<f64> = sum.into_iter().map(|v| v / responders as f64).collect();
    let indexes = SimilaritySearch::rank_by_score(&mean);

    Ok(CoordinatorResponse {
        result: mean,
        indexes: Some(indexes),
    })
}
