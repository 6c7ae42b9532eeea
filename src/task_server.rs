//! Shared accept loop for worker and coordinator nodes.
//!
//! Each accepted connection gets its own spawned task that reads one
//! [`TaskMessage`], hands it to the node's [`TaskHandler`], writes back the
//! response and closes. Any failure along the way is logged and the connection
//! is dropped without a reply.

use std::net::SocketAddr;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ReadLimits;
use crate::errors::{ClusterError, ClusterResult};
use crate::protocol;
use crate::types::{CoordinatorResponse, TaskMessage};

/// Computation performed by a node for one decoded task
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Short name used in log lines
    fn role(&self) -> &'static str;

    async fn handle(&self, task: TaskMessage) -> ClusterResult<CoordinatorResponse>;
}

/// Running server; dropping it without calling [`shutdown`](Self::shutdown)
/// leaves the accept loop running until the runtime stops.
pub struct TaskServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskServer {
    /// Bind `addr` and start accepting connections for `handler`
    pub async fn bind<H: TaskHandler>(addr: &str, limits: ReadLimits, handler: Arc<H>) -> ClusterResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ClusterError::Io {
            message: format!("Failed to bind {}: {}", addr, e),
        })?;
        let local_addr = listener.local_addr()?;
        log::info!("{} listening on {}", handler.role(), local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::run(listener, handler, limits, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections; in-flight connections run to completion
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    async fn run<H: TaskHandler>(
        listener: TcpListener,
        handler: Arc<H>,
        limits: ReadLimits,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            log::debug!("{} accepted connection from {}", handler.role(), peer);
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler.as_ref(), &limits).await {
                                    log::warn!("{} dropped connection from {}: {}", handler.role(), peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            log::warn!("{} failed to accept connection: {}", handler.role(), e);
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    log::info!("{} shutting down", handler.role());
                    break;
                }
            }
        }
    }

    async fn handle_connection<H: TaskHandler>(
        mut stream: TcpStream,
        handler: &H,
        limits: &ReadLimits,
    ) -> ClusterResult<()> {
        let task: TaskMessage = protocol::read_message(&mut stream, limits).await?;
        log::info!("{} received {} task ({} users)", handler.role(), task.kind, task.matrix.num_users());

        let response = handler.handle(task).await?;
        protocol::write_message(&mut stream, &response).await?;

        log::debug!("{} sent response with {} values", handler.role(), response.result.len());
        Ok(())
    }
}
