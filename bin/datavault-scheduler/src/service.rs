//! Scheduler gRPC service implementation.
//!
//! `SendHeartbeat` keeps the worker registry fresh;
//! `AssignWorkerForChunk` is the single serialization point for chunk
//! placement: it either hands out a fresh round-robin assignment or
//! refuses with the prior decision. Nothing else writes placement rows.

use chrono::Utc;
use datavault_common::format_already_assigned;
use datavault_meta_store::{MetaStore, MetaStoreError, PlacementRecord};
use datavault_placement::{RoundRobin, WorkerRegistry};
use datavault_proto::scheduler::scheduler_service_server::SchedulerService;
use datavault_proto::scheduler::{
    AssignWorkerRequest, AssignWorkerResponse, HeartbeatRequest, HeartbeatResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

/// Heartbeat and placement service state.
pub struct PlacementService {
    registry: Arc<WorkerRegistry>,
    store: Arc<MetaStore>,
    cursor: RoundRobin,
}

impl PlacementService {
    pub fn new(registry: Arc<WorkerRegistry>, store: Arc<MetaStore>) -> Self {
        Self {
            registry,
            store,
            cursor: RoundRobin::new(),
        }
    }
}

fn already_assigned(existing: &PlacementRecord) -> Status {
    let worker_id = existing.worker_id.as_deref().unwrap_or_default();
    let address = existing.worker_address.as_deref().unwrap_or_default();
    Status::already_exists(format_already_assigned(worker_id, address))
}

#[tonic::async_trait]
impl SchedulerService for PlacementService {
    async fn send_heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        if req.worker_id.is_empty() || req.address.is_empty() {
            return Err(Status::invalid_argument("worker_id and address are required"));
        }

        self.registry.record_heartbeat(&req.worker_id, &req.address);
        debug!(worker_id = %req.worker_id, address = %req.address, "heartbeat");

        Ok(Response::new(HeartbeatResponse {
            acknowledged: true,
            message: format!("Heartbeat received from {}", req.worker_id),
        }))
    }

    async fn assign_worker_for_chunk(
        &self,
        request: Request<AssignWorkerRequest>,
    ) -> Result<Response<AssignWorkerResponse>, Status> {
        let req = request.into_inner();

        let active = self.registry.active();
        if active.is_empty() {
            return Err(Status::unavailable("No active workers available"));
        }

        // Redeliveries must converge on the first decision.
        match self.store.find_by_file_and_chunk(&req.file_id, req.chunk_id) {
            Ok(Some(existing)) if existing.is_assigned() => {
                return Err(already_assigned(&existing));
            }
            Ok(_) => {}
            Err(e) => {
                error!("placement lookup failed: {e}");
                return Err(Status::internal("placement lookup failed"));
            }
        }

        let Some(pick) = self.cursor.select(&active) else {
            return Err(Status::unavailable("No active workers available"));
        };

        match self.store.assign_worker(
            &req.file_id,
            req.chunk_id,
            &pick.worker_id,
            &pick.address,
            Utc::now(),
        ) {
            Ok(record) => {
                info!(
                    file_id = %record.file_id,
                    chunk_id = record.chunk_id,
                    worker_id = %pick.worker_id,
                    "assigned chunk"
                );
                Ok(Response::new(AssignWorkerResponse {
                    assigned_worker_id: pick.worker_id.clone(),
                    assigned_worker_address: pick.address.clone(),
                }))
            }
            // Lost an insert race; yield to the winner.
            Err(MetaStoreError::AlreadyAssigned(existing)) => Err(already_assigned(&existing)),
            Err(e) => {
                error!("placement write failed: {e}");
                Err(Status::internal("placement write failed"))
            }
        }
    }
}
