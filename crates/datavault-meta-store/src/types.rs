//! Stored record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the placement table.
///
/// The ingest path writes a chunk-0 row carrying `filename` and `size`
/// before any worker is chosen; the placement path later fills in
/// `worker_id`/`worker_address`. A row with `worker_id == None` is a
/// placeholder: it names the file but holds no data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub file_id: String,
    pub chunk_id: u32,
    pub filename: String,
    /// Whole-file size in bytes. Authoritative on the chunk-0 row;
    /// mirrored onto other rows of the same file.
    pub size: u64,
    pub worker_id: Option<String>,
    pub worker_address: Option<String>,
    pub upload_time: DateTime<Utc>,
}

impl PlacementRecord {
    /// Whether a worker has been chosen for this chunk.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.worker_id.is_some()
    }
}
