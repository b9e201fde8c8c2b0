//! DataVault Placement - worker membership and selection
//!
//! The scheduler keeps an in-memory, liveness-filtered directory of
//! workers ([`WorkerRegistry`]) and picks a worker for each new chunk
//! with an atomic round-robin counter ([`RoundRobin`]). Both are
//! process-local; workers re-register via heartbeat after a scheduler
//! restart.

pub mod registry;
pub mod round_robin;

pub use registry::{ActiveWorker, WorkerRegistry};
pub use round_robin::RoundRobin;
