//! Coordinator node: server role over the [`Dispatcher`].
//!
//! Accepts one task per connection from the service layer and replies exactly
//! like a worker would.

use std::sync::Arc;
use async_trait::async_trait;

use crate::config::CoordinatorConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::ClusterResult;
use crate::task_server::{TaskHandler, TaskServer};
use crate::types::{CoordinatorResponse, TaskMessage};

pub struct CoordinatorNode {
    dispatcher: Dispatcher,
}

impl CoordinatorNode {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Bind a coordinator server with `config`
    pub async fn serve(config: &CoordinatorConfig) -> ClusterResult<TaskServer> {
        let node = Arc::new(Self::new(Dispatcher::from_config(config)));
        log::info!("Coordinator configured with {} workers: {:?}", config.workers.len(), config.workers);
        TaskServer::bind(&config.bind_addr, config.limits, node).await
    }
}

#[async_trait]
impl TaskHandler for CoordinatorNode {
    fn role(&self) -> &'static str {
        "coordinator"
    }

    async fn handle(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse> {
        self.dispatcher.process(task).await
    }
}
