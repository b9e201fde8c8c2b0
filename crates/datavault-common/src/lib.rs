//! DataVault Common - shared constants and utilities
//!
//! This crate provides the cluster-wide tunables and the chunking
//! primitive used by both the scheduler and the workers.

pub mod assignment;
pub mod chunker;

pub use assignment::{format_already_assigned, parse_already_assigned};
pub use chunker::{chunk_count, Chunker};

use std::time::Duration;

/// Fixed chunk size for file splitting (128 KiB). The last chunk of a
/// file may be shorter.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// A worker is active iff its last heartbeat is within this window.
/// Must stay >= 2 x HEARTBEAT_PERIOD plus network slack.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// How often each worker sends a heartbeat to the scheduler.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(2);

/// How often the scheduler purges workers with expired heartbeats.
pub const REAPER_PERIOD: Duration = Duration::from_secs(5);

/// Deadline applied to every internal RPC.
pub const RPC_DEADLINE: Duration = Duration::from_secs(10);

/// Name of the durable broker queue carrying chunk messages.
pub const FILE_CHUNKS_QUEUE: &str = "fileChunksQueue";
