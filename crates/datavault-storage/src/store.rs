//! Chunk file I/O.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from the chunk store.
#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("chunk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Disk-backed chunk storage for one worker.
///
/// Writes are plain file writes: no fsync, no rename dance. A chunk is
/// as durable as the filesystem underneath it. Re-storing an existing
/// chunk overwrites it, which keeps broker redeliveries idempotent.
pub struct ChunkStore {
    dir: PathBuf,
    worker_id: String,
}

impl ChunkStore {
    /// Create a store rooted at `<storage_root>/<worker_id>`. The
    /// directory is created on open and again on each write, so a
    /// deleted tree heals itself.
    pub async fn open(
        storage_root: impl AsRef<Path>,
        worker_id: &str,
    ) -> Result<Self, ChunkStoreError> {
        validate_id(worker_id)?;
        let dir = storage_root.as_ref().join(worker_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            worker_id: worker_id.to_string(),
        })
    }

    /// The worker identity this store writes under.
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Directory holding this worker's chunks.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one chunk, overwriting any previous bytes for the same
    /// `(file_id, chunk_id)`.
    pub async fn write(
        &self,
        file_id: &str,
        chunk_id: u32,
        data: &[u8],
    ) -> Result<(), ChunkStoreError> {
        let path = self.chunk_path(file_id, chunk_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, data).await?;
        debug!(file_id, chunk_id, bytes = data.len(), "stored chunk");
        Ok(())
    }

    /// Read one chunk back. `Ok(None)` when no such chunk exists; other
    /// I/O failures surface as errors for the caller to map in-band.
    pub async fn read(
        &self,
        file_id: &str,
        chunk_id: u32,
    ) -> Result<Option<Vec<u8>>, ChunkStoreError> {
        let path = self.chunk_path(file_id, chunk_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn chunk_path(&self, file_id: &str, chunk_id: u32) -> Result<PathBuf, ChunkStoreError> {
        validate_id(file_id)?;
        Ok(self.dir.join(format!("{file_id}_{chunk_id}.chunk")))
    }
}

/// Identifiers become path components; refuse anything that could
/// escape the storage directory.
fn validate_id(id: &str) -> Result<(), ChunkStoreError> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
    {
        return Err(ChunkStoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> ChunkStore {
        ChunkStore::open(dir.path(), "worker-1").await.unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.write("file-1", 0, b"hello").await.unwrap();
        let bytes = store.read("file-1", 0).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_read_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert!(store.read("nope", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_chunk() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.write("file-1", 0, b"").await.unwrap();
        assert_eq!(store.read("file-1", 0).await.unwrap().as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_overwrite_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.write("file-1", 0, b"first").await.unwrap();
        store.write("file-1", 0, b"first").await.unwrap();

        assert_eq!(
            store.read("file-1", 0).await.unwrap().as_deref(),
            Some(&b"first"[..])
        );
        let entries = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_files_with_same_chunk_id_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.write("file-a", 0, b"aaa").await.unwrap();
        store.write("file-b", 0, b"bbb").await.unwrap();

        assert_eq!(store.read("file-a", 0).await.unwrap().as_deref(), Some(&b"aaa"[..]));
        assert_eq!(store.read("file-b", 0).await.unwrap().as_deref(), Some(&b"bbb"[..]));
    }

    #[tokio::test]
    async fn test_workers_are_isolated() {
        let dir = TempDir::new().unwrap();
        let w1 = ChunkStore::open(dir.path(), "worker-1").await.unwrap();
        let w2 = ChunkStore::open(dir.path(), "worker-2").await.unwrap();

        w1.write("file-1", 0, b"on w1").await.unwrap();
        assert!(w2.read("file-1", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal_ids() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        for bad in ["../evil", "a/b", "a\\b", "", ".."] {
            let err = store.write(bad, 0, b"x").await.unwrap_err();
            assert!(matches!(err, ChunkStoreError::InvalidId(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_heals_deleted_directory() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        std::fs::remove_dir_all(store.dir()).unwrap();
        store.write("file-1", 0, b"back").await.unwrap();
        assert!(store.read("file-1", 0).await.unwrap().is_some());
    }
}
