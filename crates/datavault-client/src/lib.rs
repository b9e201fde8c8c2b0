//! DataVault Client - cached connections to worker RPC servers.
//!
//! Used by the scheduler's download path and by workers forwarding
//! chunks to peers.

pub mod pool;

pub use pool::{WorkerPool, WorkerPoolError};
