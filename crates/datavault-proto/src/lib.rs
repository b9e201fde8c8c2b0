//! DataVault Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for DataVault's
//! internal gRPC services.

/// Scheduler service (heartbeat and chunk placement)
pub mod scheduler {
    tonic::include_proto!("datavault.scheduler");
}

/// Worker service (chunk store and retrieve)
pub mod worker {
    tonic::include_proto!("datavault.worker");
}
