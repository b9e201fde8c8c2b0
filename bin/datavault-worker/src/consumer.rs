//! Chunk message consumer.
//!
//! Every worker subscribes to the chunk queue. For each message the
//! consumer asks the scheduler which worker owns the chunk, then either
//! stores it locally or forwards it to the owning peer. A message is
//! acked only after the bytes are safely stored somewhere; anything
//! transient is requeued.

use async_trait::async_trait;
use datavault_client::WorkerPool;
use datavault_common::{parse_already_assigned, RPC_DEADLINE};
use datavault_proto::scheduler::scheduler_service_client::SchedulerServiceClient;
use datavault_proto::scheduler::AssignWorkerRequest;
use datavault_queue::{ChunkMessage, Disposition, MessageHandler};
use datavault_storage::ChunkStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tonic::Code;
use tracing::{debug, warn};

/// Pause before requeueing so a stuck chunk does not spin hot through
/// the broker.
const REQUEUE_BACKOFF: Duration = Duration::from_secs(1);

/// A placement decision: which worker owns a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub worker_id: String,
    pub address: String,
}

/// Failures from the placement call.
#[derive(Debug, Error)]
pub enum AssignError {
    /// The chunk was placed earlier; honor the carried decision.
    #[error("chunk already assigned to {}", .0.worker_id)]
    AlreadyAssigned(Assignment),

    /// The scheduler has no live workers right now.
    #[error("no active workers")]
    NoActiveWorkers,

    #[error("placement rpc failed: {0}")]
    Rpc(String),
}

/// Seam over the scheduler's assignment RPC, so the consumer is testable
/// without a live scheduler.
#[async_trait]
pub trait PlacementClient: Send + Sync {
    async fn assign_worker(
        &self,
        requester_worker_id: &str,
        file_id: &str,
        chunk_id: u32,
    ) -> Result<Assignment, AssignError>;
}

/// tonic-backed placement client with lazy connect and reconnect on
/// failure.
pub struct SchedulerClient {
    endpoint: String,
    client: Mutex<Option<SchedulerServiceClient<Channel>>>,
}

impl SchedulerClient {
    /// `endpoint` is a full URI, e.g. `http://localhost:6000`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<SchedulerServiceClient<Channel>, AssignError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = SchedulerServiceClient::connect(self.endpoint.clone())
            .await
            .map_err(|e| AssignError::Rpc(format!("scheduler unreachable: {e}")))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn reset(&self) {
        *self.client.lock().await = None;
    }
}

#[async_trait]
impl PlacementClient for SchedulerClient {
    async fn assign_worker(
        &self,
        requester_worker_id: &str,
        file_id: &str,
        chunk_id: u32,
    ) -> Result<Assignment, AssignError> {
        let mut client = self.client().await?;
        let request = AssignWorkerRequest {
            requester_worker_id: requester_worker_id.to_string(),
            file_id: file_id.to_string(),
            chunk_id,
        };

        let status = match tokio::time::timeout(RPC_DEADLINE, client.assign_worker_for_chunk(request))
            .await
        {
            Err(_) => {
                self.reset().await;
                return Err(AssignError::Rpc("placement deadline exceeded".to_string()));
            }
            Ok(Ok(response)) => {
                let response = response.into_inner();
                return Ok(Assignment {
                    worker_id: response.assigned_worker_id,
                    address: response.assigned_worker_address,
                });
            }
            Ok(Err(status)) => status,
        };

        match status.code() {
            Code::Unavailable => Err(AssignError::NoActiveWorkers),
            Code::AlreadyExists => match parse_already_assigned(status.message()) {
                Some((worker_id, address)) => Err(AssignError::AlreadyAssigned(Assignment {
                    worker_id,
                    address,
                })),
                None => Err(AssignError::Rpc(format!(
                    "unparseable assignment refusal: {}",
                    status.message()
                ))),
            },
            _ => {
                self.reset().await;
                Err(AssignError::Rpc(status.to_string()))
            }
        }
    }
}

/// Handles one chunk message end to end.
pub struct ChunkConsumer<P: PlacementClient> {
    worker_id: String,
    placement: P,
    store: Arc<ChunkStore>,
    peers: Arc<WorkerPool>,
    requeue_delay: Duration,
}

impl<P: PlacementClient> ChunkConsumer<P> {
    pub fn new(worker_id: String, placement: P, store: Arc<ChunkStore>, peers: Arc<WorkerPool>) -> Self {
        Self {
            worker_id,
            placement,
            store,
            peers,
            requeue_delay: REQUEUE_BACKOFF,
        }
    }

    /// Tests drop the backoff to keep redelivery loops fast.
    #[must_use]
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    async fn requeue(&self) -> Disposition {
        if !self.requeue_delay.is_zero() {
            tokio::time::sleep(self.requeue_delay).await;
        }
        Disposition::Requeue
    }

    async fn deliver(&self, assignment: &Assignment, msg: &ChunkMessage, data: Vec<u8>) -> Disposition {
        let result = if assignment.worker_id == self.worker_id {
            debug!(file_id = %msg.file_id, chunk_id = msg.chunk_id, "storing chunk locally");
            self.store
                .write(&msg.file_id, msg.chunk_id, &data)
                .await
                .map_err(|e| e.to_string())
        } else {
            debug!(
                file_id = %msg.file_id,
                chunk_id = msg.chunk_id,
                peer = %assignment.worker_id,
                "forwarding chunk to assigned worker"
            );
            self.peers
                .store_chunk(
                    &assignment.address,
                    &assignment.worker_id,
                    &msg.file_id,
                    msg.chunk_id,
                    data,
                )
                .await
                .map_err(|e| e.to_string())
        };

        match result {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                warn!(
                    file_id = %msg.file_id,
                    chunk_id = msg.chunk_id,
                    worker_id = %assignment.worker_id,
                    "chunk store failed, requeueing: {e}"
                );
                self.requeue().await
            }
        }
    }
}

#[async_trait]
impl<P: PlacementClient> MessageHandler for ChunkConsumer<P> {
    async fn handle(&self, payload: &[u8]) -> Disposition {
        // Malformed payloads are poison: redelivery cannot fix them, so
        // they are dropped with an ack.
        let msg = match ChunkMessage::from_json(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping malformed chunk message: {e}");
                return Disposition::Ack;
            }
        };
        let data = match msg.decode_data() {
            Ok(data) => data,
            Err(e) => {
                warn!(file_id = %msg.file_id, chunk_id = msg.chunk_id, "dropping undecodable chunk: {e}");
                return Disposition::Ack;
            }
        };

        match self
            .placement
            .assign_worker(&self.worker_id, &msg.file_id, msg.chunk_id)
            .await
        {
            Ok(assignment) => self.deliver(&assignment, &msg, data).await,
            // Redelivery of a chunk placed earlier: honor the decision.
            Err(AssignError::AlreadyAssigned(assignment)) => {
                self.deliver(&assignment, &msg, data).await
            }
            Err(AssignError::NoActiveWorkers) => {
                warn!(
                    file_id = %msg.file_id,
                    chunk_id = msg.chunk_id,
                    "no active workers, requeueing chunk"
                );
                self.requeue().await
            }
            Err(AssignError::Rpc(e)) => {
                warn!(file_id = %msg.file_id, chunk_id = msg.chunk_id, "placement failed, requeueing: {e}");
                self.requeue().await
            }
        }
    }
}
