//! HTTP listener for the replica.

use super::routes::{create_router, RpcState};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Errors from the HTTP listener.
#[derive(Debug, Error)]
pub enum RpcServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Configuration for the HTTP listener.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub listen_addr: SocketAddr,
}

/// Handle for controlling a running listener.
#[derive(Debug)]
pub struct RpcServerHandle {
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl RpcServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the server task to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// HTTP server exposing the replica's endpoints.
pub struct RpcServer {
    config: RpcServerConfig,
    state: RpcState,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, state: RpcState) -> Self {
        Self { config, state }
    }

    /// Bind the listener and start serving in a background task.
    pub async fn start(self) -> Result<RpcServerHandle, RpcServerError> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RpcServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RpcServerError::Bind { addr, source })?;

        let router = create_router(self.state);
        info!(addr = %local_addr, "http listener started");

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                error!(error = %err, "http server terminated");
            }
        });

        Ok(RpcServerHandle { task, local_addr })
    }
}
