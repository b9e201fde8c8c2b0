//! DataVault Storage - on-disk chunk storage for workers.
//!
//! One file per chunk under `<storage_root>/<worker_id>/`, named
//! `<file_id>_<chunk_id>.chunk` so two files sharing a worker can never
//! collide on a chunk id.

pub mod store;

pub use store::{ChunkStore, ChunkStoreError};
