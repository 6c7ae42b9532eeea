//! End-to-end tests for the coordinator / worker cluster over real TCP sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recocluster_lib::cache::InMemoryCache;
use recocluster_lib::dataset::{Dataset, IdMappings};
use recocluster_lib::history::InMemoryHistoryStore;
use recocluster_lib::protocol::{self, ExchangeOptions};
use recocluster_lib::task_server::TaskHandler;
use recocluster_lib::{
    ClusterError, ClusterResult, CoordinatorClient, CoordinatorConfig, CoordinatorNode, CoordinatorResponse,
    ItemRecord, RatingMatrix, ReadLimits, RecommendationBackend, RecommendationService, SimilaritySearch,
    TaskMessage, TaskServer, WorkerConfig, WorkerNode,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Worker double that answers every task with a fixed vector
struct FixedWorker(Vec<f64>);

#[async_trait]
impl TaskHandler for FixedWorker {
    fn role(&self) -> &'static str {
        "fixed-worker"
    }

    async fn handle(&self, _task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        Ok(CoordinatorResponse {
            result: self.0.clone(),
            indexes: None,
        })
    }
}

fn sample_matrix() -> RatingMatrix {
    RatingMatrix::new(vec![
        vec![1.0, 0.5, 0.0, 0.0],
        vec![0.2, 0.0, 0.8, 0.6],
        vec![0.0, 0.9, 0.4, 0.0],
        vec![0.7, 0.0, 0.0, 0.3],
    ])
    .unwrap()
}

fn local_options() -> ExchangeOptions {
    ExchangeOptions {
        connect_timeout: Duration::from_millis(500),
        io_timeout: Duration::from_secs(5),
        ..ExchangeOptions::default()
    }
}

async fn start_worker() -> TaskServer {
    let config = WorkerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        limits: ReadLimits::default(),
    };
    WorkerNode::serve(&config).await.unwrap()
}

async fn start_fixed_worker(values: Vec<f64>) -> TaskServer {
    TaskServer::bind("127.0.0.1:0", ReadLimits::default(), Arc::new(FixedWorker(values)))
        .await
        .unwrap()
}

/// Address with nothing listening on it
fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn start_coordinator(workers: Vec<String>, worker_read_timeout_ms: u64) -> TaskServer {
    let config = CoordinatorConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        workers,
        connect_timeout_ms: 500,
        worker_read_timeout_ms,
        limits: ReadLimits::default(),
    };
    CoordinatorNode::serve(&config).await.unwrap()
}

#[tokio::test]
async fn test_worker_answers_recommendation_task() {
    let worker = start_worker().await;
    let task = TaskMessage::recommendation(sample_matrix(), 0, 2);

    let response = protocol::send_task(&worker.local_addr().to_string(), &task, &local_options())
        .await
        .unwrap();
    let expected = WorkerNode::compute(&task).unwrap();

    assert_eq!(response, expected);
    worker.shutdown().await;
}

#[tokio::test]
async fn test_mean_over_responders_with_one_dead_worker() {
    let w1 = start_fixed_worker(vec![1.0, 2.0, 3.0, 0.0]).await;
    let w2 = start_fixed_worker(vec![3.0, 2.0, 1.0, 0.0]).await;
    let coordinator = start_coordinator(
        vec![w1.local_addr().to_string(), w2.local_addr().to_string(), dead_addr()],
        5_000,
    )
    .await;

    let task = TaskMessage::recommendation(sample_matrix(), 1, 2);
    let response = protocol::send_task(&coordinator.local_addr().to_string(), &task, &local_options())
        .await
        .unwrap();

    assert_eq!(response.result, vec![2.0, 2.0, 2.0, 0.0]);
    assert_eq!(response.indexes, Some(vec![0, 1, 2, 3]));

    coordinator.shutdown().await;
    w1.shutdown().await;
    w2.shutdown().await;
}

#[tokio::test]
async fn test_replicated_workers_match_local_computation() {
    let workers = vec![start_worker().await, start_worker().await, start_worker().await];
    let addrs = workers.iter().map(|w| w.local_addr().to_string()).collect();
    let coordinator = start_coordinator(addrs, 5_000).await;

    let task = TaskMessage::recommendation(sample_matrix(), 2, 3);
    let response = protocol::send_task(&coordinator.local_addr().to_string(), &task, &local_options())
        .await
        .unwrap();
    let local = WorkerNode::compute(&task).unwrap();

    assert_eq!(response.result.len(), local.result.len());
    for (remote, local) in response.result.iter().zip(&local.result) {
        assert!((remote - local).abs() < 1e-12);
    }
    assert_eq!(response.indexes, local.indexes);

    coordinator.shutdown().await;
    for worker in workers {
        worker.shutdown().await;
    }
}

#[tokio::test]
async fn test_no_responders_drops_connection() {
    let coordinator = start_coordinator(vec![dead_addr(), dead_addr()], 5_000).await;

    let task = TaskMessage::recommendation(sample_matrix(), 0, 2);
    let err = protocol::send_task(&coordinator.local_addr().to_string(), &task, &local_options())
        .await
        .unwrap_err();

    // No structured error on the wire, just a closed connection
    assert!(matches!(
        err,
        ClusterError::MalformedResponse { .. } | ClusterError::Unreachable { .. }
    ));
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_garbage_and_hung_workers_are_excluded() {
    let good = start_fixed_worker(vec![0.5, 0.1, 0.9, 0.3]).await;

    let garbage = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let garbage_addr = garbage.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = garbage.accept().await {
            let _ = protocol::read_to_eof(&mut socket, 1 << 20).await;
            let _ = socket.write_all(b"{\"result\": [oops").await;
        }
    });

    // Accepts and reads but never answers
    let hung = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hung_addr = hung.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = hung.accept().await {
            held.push(socket);
        }
    });

    let coordinator = start_coordinator(vec![good.local_addr().to_string(), garbage_addr, hung_addr], 300).await;

    let task = TaskMessage::recommendation(sample_matrix(), 0, 2);
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        protocol::send_task(&coordinator.local_addr().to_string(), &task, &local_options()),
    )
    .await
    .expect("coordinator must not wait on a hung worker forever")
    .unwrap();

    assert_eq!(response.result, vec![0.5, 0.1, 0.9, 0.3]);
    assert_eq!(response.indexes, Some(vec![2, 0, 3, 1]));

    coordinator.shutdown().await;
    good.shutdown().await;
}

#[tokio::test]
async fn test_similarity_computed_by_coordinator_alone() {
    let coordinator = start_coordinator(vec![dead_addr()], 5_000).await;
    let client = CoordinatorClient::new(coordinator.local_addr().to_string(), local_options());

    let matrix = RatingMatrix::new(vec![vec![1.0, 0.5, 0.0], vec![0.2, 0.0, 0.8], vec![0.0, 0.9, 0.4]]).unwrap();
    let sims = client.request_similarity(&matrix).await.unwrap();

    assert_eq!(sims, SimilaritySearch::similarity_matrix(&matrix));
    assert!((sims[1] - 0.217).abs() < 1e-3);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_service_over_live_cluster() {
    let workers = vec![start_worker().await, start_worker().await];
    let addrs = workers.iter().map(|w| w.local_addr().to_string()).collect();
    let coordinator = start_coordinator(addrs, 5_000).await;
    let client = Arc::new(CoordinatorClient::new(coordinator.local_addr().to_string(), local_options()));

    let mut mappings = IdMappings::new();
    for (index, id) in ["u1", "u2", "u3", "u4"].iter().enumerate() {
        mappings.insert_user(*id, index);
    }
    let items: Vec<ItemRecord> = (0..4)
        .map(|i| {
            mappings.insert_item(format!("m{}", i), i);
            ItemRecord::new(format!("m{}", i), format!("Title {}", i), if i % 2 == 0 { "Drama" } else { "Comedy" })
        })
        .collect();
    let dataset = Arc::new(Dataset::new(sample_matrix(), mappings, items).unwrap());

    let expected_ranking = client
        .request_recommendations(0, dataset.matrix(), 2)
        .await
        .unwrap();

    let history = Arc::new(InMemoryHistoryStore::seeded(
        dataset.mappings().user_ids(),
        dataset.items_sorted(),
    ));
    let service = RecommendationService::new(
        dataset.clone(),
        client,
        Arc::new(InMemoryCache::new(16)),
        history,
        Duration::from_secs(60),
    );

    let recommendation = service.recommend("u1", 2, "").await.unwrap();
    assert!(recommendation.metrics.is_some());
    let items = recommendation.items;
    let ids: Vec<String> = items.iter().map(|i| i.item_id.clone()).collect();
    let expected: Vec<String> = expected_ranking.iter().take(2).map(|i| format!("m{}", i)).collect();
    assert_eq!(ids, expected);

    assert_eq!(service.list_users(1, 3).await.unwrap(), vec!["u1", "u2", "u3"]);
    assert_eq!(service.list_items("drama", 1, 10).await.unwrap().len(), 2);
    assert_eq!(service.genres(), ["comedy", "drama"]);

    coordinator.shutdown().await;
    for worker in workers {
        worker.shutdown().await;
    }
}
