//! DataVault Scheduler - HTTP ingress, metadata owner, and worker
//! placement.
//!
//! One process serves the upload/download HTTP surface, the
//! heartbeat/assignment gRPC surface, and runs the reaper that purges
//! workers with expired heartbeats.

pub mod files;
pub mod service;
