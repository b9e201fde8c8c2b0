//! Worker gRPC service implementation.
//!
//! I/O failures are reported in-band (`success=false`, `found=false`)
//! rather than as RPC errors; callers decide whether to retry.

use datavault_proto::worker::worker_service_server::WorkerService;
use datavault_proto::worker::{
    RetrieveChunkRequest, RetrieveChunkResponse, StoreChunkRequest, StoreChunkResponse,
};
use datavault_storage::ChunkStore;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::warn;

/// Chunk store/retrieve service backed by this worker's disk.
pub struct ChunkService {
    store: Arc<ChunkStore>,
}

impl ChunkService {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }
}

#[tonic::async_trait]
impl WorkerService for ChunkService {
    async fn store_chunk(
        &self,
        request: Request<StoreChunkRequest>,
    ) -> Result<Response<StoreChunkResponse>, Status> {
        let req = request.into_inner();

        // A chunk addressed to another worker landing here means routing
        // went wrong; refusing beats silently storing under the wrong
        // identity.
        if req.worker_id != self.store.worker_id() {
            warn!(
                requested = %req.worker_id,
                actual = %self.store.worker_id(),
                "rejecting chunk addressed to another worker"
            );
            return Ok(Response::new(StoreChunkResponse {
                success: false,
                message: format!(
                    "chunk addressed to worker {} but this worker is {}",
                    req.worker_id,
                    self.store.worker_id()
                ),
            }));
        }

        match self.store.write(&req.file_id, req.chunk_id, &req.chunk_data).await {
            Ok(()) => Ok(Response::new(StoreChunkResponse {
                success: true,
                message: "Chunk stored successfully".to_string(),
            })),
            Err(e) => {
                warn!(file_id = %req.file_id, chunk_id = req.chunk_id, "store failed: {e}");
                Ok(Response::new(StoreChunkResponse {
                    success: false,
                    message: e.to_string(),
                }))
            }
        }
    }

    async fn retrieve_chunk(
        &self,
        request: Request<RetrieveChunkRequest>,
    ) -> Result<Response<RetrieveChunkResponse>, Status> {
        let req = request.into_inner();

        if req.worker_id != self.store.worker_id() {
            warn!(
                requested = %req.worker_id,
                actual = %self.store.worker_id(),
                "rejecting retrieval addressed to another worker"
            );
            return Ok(Response::new(RetrieveChunkResponse {
                chunk_data: Vec::new(),
                found: false,
            }));
        }

        let chunk_data = match self.store.read(&req.file_id, req.chunk_id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Ok(Response::new(RetrieveChunkResponse {
                    chunk_data: Vec::new(),
                    found: false,
                }));
            }
            Err(e) => {
                warn!(file_id = %req.file_id, chunk_id = req.chunk_id, "read failed: {e}");
                return Ok(Response::new(RetrieveChunkResponse {
                    chunk_data: Vec::new(),
                    found: false,
                }));
            }
        };

        Ok(Response::new(RetrieveChunkResponse {
            chunk_data,
            found: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> ChunkService {
        let store = ChunkStore::open(dir.path(), "worker-1").await.unwrap();
        ChunkService::new(Arc::new(store))
    }

    fn store_request(worker_id: &str, data: &[u8]) -> Request<StoreChunkRequest> {
        Request::new(StoreChunkRequest {
            worker_id: worker_id.to_string(),
            file_id: "file-1".to_string(),
            chunk_id: 0,
            chunk_data: data.to_vec(),
        })
    }

    fn retrieve_request(worker_id: &str, file_id: &str) -> Request<RetrieveChunkRequest> {
        Request::new(RetrieveChunkRequest {
            worker_id: worker_id.to_string(),
            file_id: file_id.to_string(),
            chunk_id: 0,
        })
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let stored = service
            .store_chunk(store_request("worker-1", b"hello"))
            .await
            .unwrap()
            .into_inner();
        assert!(stored.success);
        assert!(stored.message.contains("stored"));

        let retrieved = service
            .retrieve_chunk(retrieve_request("worker-1", "file-1"))
            .await
            .unwrap()
            .into_inner();
        assert!(retrieved.found);
        assert_eq!(retrieved.chunk_data, b"hello");
    }

    #[tokio::test]
    async fn test_retrieve_unknown_chunk() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let response = service
            .retrieve_chunk(retrieve_request("worker-1", "nope"))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.found);
        assert!(response.chunk_data.is_empty());
    }

    #[tokio::test]
    async fn test_store_rejects_wrong_worker_id() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let response = service
            .store_chunk(store_request("worker-2", b"hello"))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.success);
        assert!(response.message.contains("worker-2"));

        // Nothing was written under either identity.
        let retrieved = service
            .retrieve_chunk(retrieve_request("worker-1", "file-1"))
            .await
            .unwrap()
            .into_inner();
        assert!(!retrieved.found);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_wrong_worker_id() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        service
            .store_chunk(store_request("worker-1", b"hello"))
            .await
            .unwrap();

        let response = service
            .retrieve_chunk(retrieve_request("worker-2", "file-1"))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.found);
    }

    #[tokio::test]
    async fn test_store_reports_invalid_file_id_in_band() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;

        let response = service
            .store_chunk(Request::new(StoreChunkRequest {
                worker_id: "worker-1".to_string(),
                file_id: "../escape".to_string(),
                chunk_id: 0,
                chunk_data: b"x".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.success);
    }
}
