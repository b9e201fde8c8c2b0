//! Worker connection pool.
//!
//! Connections are created lazily per `host:port`, cached across RPCs,
//! and dropped on failure so the next call reconnects.

use datavault_common::RPC_DEADLINE;
use datavault_proto::worker::worker_service_client::WorkerServiceClient;
use datavault_proto::worker::{RetrieveChunkRequest, StoreChunkRequest};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tonic::transport::Channel;
use tracing::{info, warn};

/// Error type for worker pool operations
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("rpc failed: {0}")]
    Rpc(String),

    #[error("request timeout")]
    Timeout,

    #[error("worker rejected store: {0}")]
    StoreRejected(String),
}

/// Pool of worker connections keyed by address.
#[derive(Default)]
pub struct WorkerPool {
    clients: RwLock<HashMap<String, WorkerServiceClient<Channel>>>,
}

impl WorkerPool {
    /// Create a new empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client for `address`, connecting if necessary.
    pub async fn get_or_connect(
        &self,
        address: &str,
    ) -> Result<WorkerServiceClient<Channel>, WorkerPoolError> {
        // Fast path: already connected.
        if let Some(client) = self.clients.read().await.get(address) {
            return Ok(client.clone());
        }

        // Connect without holding the lock.
        let endpoint = tonic::transport::Endpoint::new(format!("http://{address}"))
            .map_err(|e| WorkerPoolError::ConnectionFailed(e.to_string()))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| WorkerPoolError::ConnectionFailed(e.to_string()))?;
        let client = WorkerServiceClient::new(channel);

        // Re-check: another task may have connected while we did.
        let mut clients = self.clients.write().await;
        if let Some(existing) = clients.get(address) {
            return Ok(existing.clone());
        }
        clients.insert(address.to_string(), client.clone());
        info!(address, "connected to worker");
        Ok(client)
    }

    /// Drop the cached connection for `address`; the next call
    /// reconnects.
    pub async fn invalidate(&self, address: &str) {
        if self.clients.write().await.remove(address).is_some() {
            info!(address, "dropped worker connection");
        }
    }

    /// Number of cached connections.
    pub async fn connected(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Store one chunk on the worker at `address`, with the standard
    /// RPC deadline. Any transport failure invalidates the cached
    /// connection.
    pub async fn store_chunk(
        &self,
        address: &str,
        worker_id: &str,
        file_id: &str,
        chunk_id: u32,
        chunk_data: Vec<u8>,
    ) -> Result<(), WorkerPoolError> {
        let mut client = self.get_or_connect(address).await?;

        let request = StoreChunkRequest {
            worker_id: worker_id.to_string(),
            file_id: file_id.to_string(),
            chunk_id,
            chunk_data,
        };

        let response = match tokio::time::timeout(RPC_DEADLINE, client.store_chunk(request)).await {
            Err(_) => {
                warn!(address, file_id, chunk_id, "store chunk timed out");
                self.invalidate(address).await;
                return Err(WorkerPoolError::Timeout);
            }
            Ok(Err(status)) => {
                warn!(address, file_id, chunk_id, "store chunk failed: {status}");
                self.invalidate(address).await;
                return Err(WorkerPoolError::Rpc(status.to_string()));
            }
            Ok(Ok(response)) => response.into_inner(),
        };

        if response.success {
            Ok(())
        } else {
            Err(WorkerPoolError::StoreRejected(response.message))
        }
    }

    /// Retrieve one chunk from the worker at `address`. `Ok(None)` when
    /// the worker reports the chunk missing.
    pub async fn retrieve_chunk(
        &self,
        address: &str,
        worker_id: &str,
        file_id: &str,
        chunk_id: u32,
    ) -> Result<Option<Vec<u8>>, WorkerPoolError> {
        let mut client = self.get_or_connect(address).await?;

        let request = RetrieveChunkRequest {
            worker_id: worker_id.to_string(),
            file_id: file_id.to_string(),
            chunk_id,
        };

        let response =
            match tokio::time::timeout(RPC_DEADLINE, client.retrieve_chunk(request)).await {
                Err(_) => {
                    warn!(address, file_id, chunk_id, "retrieve chunk timed out");
                    self.invalidate(address).await;
                    return Err(WorkerPoolError::Timeout);
                }
                Ok(Err(status)) => {
                    warn!(address, file_id, chunk_id, "retrieve chunk failed: {status}");
                    self.invalidate(address).await;
                    return Err(WorkerPoolError::Rpc(status.to_string()));
                }
                Ok(Ok(response)) => response.into_inner(),
            };

        if response.found {
            Ok(Some(response.chunk_data))
        } else {
            Ok(None)
        }
    }
}
