//! Placement table operations.

use crate::types::PlacementRecord;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use thiserror::Error;

/// Placements: "file_id\x00{chunk_id:08x}" → JSON(PlacementRecord)
const FILE_METADATA: TableDefinition<&str, &str> = TableDefinition::new("file_metadata");

/// Errors from the metadata store.
#[derive(Debug, Error)]
pub enum MetaStoreError {
    /// The chunk already has a worker; the existing row is returned
    /// untouched so the caller can honor the prior decision.
    #[error("worker already assigned for chunk {} of file {}", .0.chunk_id, .0.file_id)]
    AlreadyAssigned(Box<PlacementRecord>),

    #[error("metadata backend error: {0}")]
    Backend(#[from] redb::Error),

    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

macro_rules! from_redb {
    ($($err:ty),*) => {
        $(impl From<$err> for MetaStoreError {
            fn from(e: $err) -> Self {
                Self::Backend(e.into())
            }
        })*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

/// Persistent placement table keyed by `(file_id, chunk_id)`.
///
/// redb gives serialized write transactions, which is what makes
/// [`MetaStore::assign_worker`] an atomic check-and-insert: at most one
/// writer wins a given composite key, every loser sees the winning row.
pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetaStoreError> {
        let db = Database::create(path)?;
        let wtx = db.begin_write()?;
        wtx.open_table(FILE_METADATA)?;
        wtx.commit()?;
        Ok(Self { db })
    }

    /// Record (or refresh) a file's attributes on its chunk-0 row.
    ///
    /// Called by the ingest path before publishing chunks (size 0) and
    /// again once the stream length is known. Merges by primary key: an
    /// existing worker assignment on the row is preserved.
    pub fn record_file(
        &self,
        file_id: &str,
        filename: &str,
        size: u64,
        upload_time: DateTime<Utc>,
    ) -> Result<(), MetaStoreError> {
        let key = placement_key(file_id, 0);
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(FILE_METADATA)?;
            let record = match read_record(&table, &key)? {
                Some(mut existing) => {
                    existing.filename = filename.to_string();
                    existing.size = size;
                    existing.upload_time = upload_time;
                    existing
                }
                None => PlacementRecord {
                    file_id: file_id.to_string(),
                    chunk_id: 0,
                    filename: filename.to_string(),
                    size,
                    worker_id: None,
                    worker_address: None,
                    upload_time,
                },
            };
            let json = serde_json::to_string(&record)?;
            table.insert(key.as_str(), json.as_str())?;
        }
        wtx.commit()?;
        Ok(())
    }

    /// Assign `worker_id` to `(file_id, chunk_id)` unless the chunk
    /// already has a worker.
    ///
    /// The whole check-and-insert runs in one write transaction. When
    /// the row already carries a worker the stored placement is returned
    /// inside [`MetaStoreError::AlreadyAssigned`] and left unchanged. A
    /// placeholder row (no worker yet) absorbs the assignment in place;
    /// a brand-new row inherits `filename`/`size` from the file's
    /// chunk-0 row when one exists.
    pub fn assign_worker(
        &self,
        file_id: &str,
        chunk_id: u32,
        worker_id: &str,
        worker_address: &str,
        upload_time: DateTime<Utc>,
    ) -> Result<PlacementRecord, MetaStoreError> {
        let key = placement_key(file_id, chunk_id);
        let wtx = self.db.begin_write()?;
        let record = {
            let mut table = wtx.open_table(FILE_METADATA)?;
            let record = match read_record(&table, &key)? {
                Some(existing) if existing.is_assigned() => {
                    return Err(MetaStoreError::AlreadyAssigned(Box::new(existing)));
                }
                Some(mut placeholder) => {
                    placeholder.worker_id = Some(worker_id.to_string());
                    placeholder.worker_address = Some(worker_address.to_string());
                    placeholder.upload_time = upload_time;
                    placeholder
                }
                None => {
                    // Mirror file attributes from the chunk-0 row so
                    // every row of a file shares the same filename.
                    let head = read_record(&table, &placement_key(file_id, 0))?;
                    let (filename, size) =
                        head.map_or_else(|| (String::new(), 0), |h| (h.filename, h.size));
                    PlacementRecord {
                        file_id: file_id.to_string(),
                        chunk_id,
                        filename,
                        size,
                        worker_id: Some(worker_id.to_string()),
                        worker_address: Some(worker_address.to_string()),
                        upload_time,
                    }
                }
            };
            let json = serde_json::to_string(&record)?;
            table.insert(key.as_str(), json.as_str())?;
            record
        };
        wtx.commit()?;
        Ok(record)
    }

    /// Resolve a filename to one of its rows. When several files share
    /// the name, the row with the lowest `(file_id, chunk_id)` wins;
    /// key order makes the first scan hit exactly that row.
    pub fn find_by_filename(&self, name: &str) -> Result<Option<PlacementRecord>, MetaStoreError> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(FILE_METADATA)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: PlacementRecord = serde_json::from_str(value.value())?;
            if record.filename == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Every row of a file, in chunk order.
    pub fn find_all_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Vec<PlacementRecord>, MetaStoreError> {
        let start = format!("{file_id}\x00");
        let end = format!("{file_id}\x01");
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(FILE_METADATA)?;
        let mut rows = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            rows.push(serde_json::from_str(value.value())?);
        }
        Ok(rows)
    }

    /// Point lookup of a single chunk row.
    pub fn find_by_file_and_chunk(
        &self,
        file_id: &str,
        chunk_id: u32,
    ) -> Result<Option<PlacementRecord>, MetaStoreError> {
        let key = placement_key(file_id, chunk_id);
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(FILE_METADATA)?;
        read_record(&table, &key)
    }
}

fn placement_key(file_id: &str, chunk_id: u32) -> String {
    // Fixed-width hex keeps chunk order and key order identical.
    format!("{file_id}\x00{chunk_id:08x}")
}

fn read_record(
    table: &impl ReadableTable<&'static str, &'static str>,
    key: &str,
) -> Result<Option<PlacementRecord>, MetaStoreError> {
    match table.get(key)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> MetaStore {
        MetaStore::open(dir.path().join("metadata.redb")).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_assign_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let record = store
            .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
            .unwrap();
        assert_eq!(record.worker_id.as_deref(), Some("worker-1"));

        let found = store.find_by_file_and_chunk("file-1", 0).unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[test]
    fn test_assignment_is_immutable() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
            .unwrap();

        // A second assignment must fail and carry the original decision.
        let err = store
            .assign_worker("file-1", 0, "worker-2", "localhost:9091", now())
            .unwrap_err();
        match err {
            MetaStoreError::AlreadyAssigned(existing) => {
                assert_eq!(existing.worker_id.as_deref(), Some("worker-1"));
                assert_eq!(existing.worker_address.as_deref(), Some("localhost:9090"));
            }
            other => panic!("expected AlreadyAssigned, got {other:?}"),
        }

        // And the stored row is unchanged.
        let row = store.find_by_file_and_chunk("file-1", 0).unwrap().unwrap();
        assert_eq!(row.worker_id.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_placeholder_then_assignment_merges() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.record_file("file-1", "hello.txt", 5, now()).unwrap();
        let record = store
            .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
            .unwrap();

        assert_eq!(record.filename, "hello.txt");
        assert_eq!(record.size, 5);
        assert_eq!(record.worker_id.as_deref(), Some("worker-1"));
        assert_eq!(store.find_all_by_file_id("file-1").unwrap().len(), 1);
    }

    #[test]
    fn test_assignment_then_record_file_keeps_worker() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
            .unwrap();
        store.record_file("file-1", "hello.txt", 5, now()).unwrap();

        let row = store.find_by_file_and_chunk("file-1", 0).unwrap().unwrap();
        assert_eq!(row.worker_id.as_deref(), Some("worker-1"));
        assert_eq!(row.filename, "hello.txt");
        assert_eq!(row.size, 5);
    }

    #[test]
    fn test_later_chunks_inherit_file_attributes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .record_file("file-1", "large.bin", 300_000, now())
            .unwrap();
        let record = store
            .assign_worker("file-1", 2, "worker-1", "localhost:9090", now())
            .unwrap();

        assert_eq!(record.filename, "large.bin");
        assert_eq!(record.size, 300_000);
    }

    #[test]
    fn test_find_all_sorted_by_chunk_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for chunk_id in [2u32, 0, 1] {
            store
                .assign_worker("file-1", chunk_id, "worker-1", "localhost:9090", now())
                .unwrap();
        }

        let ids: Vec<u32> = store
            .find_all_by_file_id("file-1")
            .unwrap()
            .iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn test_file_ids_do_not_bleed_into_each_other() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
            .unwrap();
        store
            .assign_worker("file-10", 0, "worker-2", "localhost:9091", now())
            .unwrap();

        let rows = store.find_all_by_file_id("file-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_id, "file-1");
    }

    #[test]
    fn test_find_by_filename_prefers_lowest_file_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.record_file("file-b", "dup.txt", 1, now()).unwrap();
        store.record_file("file-a", "dup.txt", 2, now()).unwrap();

        let row = store.find_by_filename("dup.txt").unwrap().unwrap();
        assert_eq!(row.file_id, "file-a");
    }

    #[test]
    fn test_find_by_filename_missing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.find_by_filename("nope.txt").unwrap().is_none());
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store
                .assign_worker("file-1", 0, "worker-1", "localhost:9090", now())
                .unwrap();
        }
        let store = open_store(&dir);
        assert!(store.find_by_file_and_chunk("file-1", 0).unwrap().is_some());
    }
}
