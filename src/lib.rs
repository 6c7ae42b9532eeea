// Module declarations
pub mod errors;
pub mod types;
pub mod config;
pub mod similarity_search;
pub mod protocol;
pub mod task_server;
pub mod worker;
pub mod dispatcher;
pub mod coordinator;
pub mod coordinator_client;
pub mod dataset;
pub mod cache;
pub mod history;
pub mod performance;
pub mod recommendation;

// Re-exports for commonly used types
pub use errors::{best_effort, ClusterError, ClusterResult};
pub use types::{CoordinatorResponse, ItemRecord, RatingMatrix, TaskKind, TaskMessage, UserSimilarity};
pub use config::{CoordinatorConfig, ReadLimits, ServiceConfig, Validate, WorkerConfig};
pub use similarity_search::{ComputeError, SimilaritySearch};
pub use dispatcher::Dispatcher;
pub use coordinator::CoordinatorNode;
pub use coordinator_client::{CoordinatorClient, RecommendationBackend};
pub use task_server::TaskServer;
pub use worker::WorkerNode;
pub use performance::{RequestMetrics, RequestTracker};
pub use recommendation::{Recommendation, RecommendationService};
