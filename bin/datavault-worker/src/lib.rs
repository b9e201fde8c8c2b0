//! DataVault Worker - chunk storage node.
//!
//! One process serves the `StoreChunk`/`RetrieveChunk` gRPC surface,
//! consumes chunk messages from the broker, and heartbeats the
//! scheduler.

pub mod consumer;
pub mod heartbeat;
pub mod service;
