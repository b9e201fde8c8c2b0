//! DataVault Metadata Store - persistent chunk placements backed by redb.
//!
//! One row per `(file_id, chunk_id)`; rows record which worker holds a
//! chunk. Placements are immutable once a worker is assigned; the only
//! in-place change ever made to an assigned row is merging file
//! attributes (filename, size) written by the ingest path.

pub mod store;
pub mod types;

pub use store::{MetaStore, MetaStoreError};
pub use types::PlacementRecord;
