//! Fixed-size chunking of a byte stream.
//!
//! The ingest path feeds multipart body frames into a [`Chunker`] and
//! publishes each full chunk as it becomes available, so a file is never
//! buffered whole.

use crate::CHUNK_SIZE;
use bytes::{Bytes, BytesMut};

/// Splits an incoming byte stream into fixed-size chunks.
///
/// `push` returns every chunk completed by the new data; `finish`
/// returns the trailing partial chunk, if any. A zero-byte stream yields
/// no chunks at all.
pub struct Chunker {
    buf: BytesMut,
    chunk_size: usize,
}

impl Chunker {
    /// Create a chunker with the cluster chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(CHUNK_SIZE)
    }

    /// Create a chunker with a custom chunk size (tests use small sizes).
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            buf: BytesMut::new(),
            chunk_size,
        }
    }

    /// Append data and drain every chunk it completes, in stream order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);
        let mut full = Vec::new();
        while self.buf.len() >= self.chunk_size {
            full.push(self.buf.split_to(self.chunk_size).freeze());
        }
        full
    }

    /// Consume the chunker, returning the final short chunk if the
    /// stream length was not a multiple of the chunk size.
    #[must_use]
    pub fn finish(mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    /// Bytes currently buffered awaiting a full chunk.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of chunks a file of `len` bytes splits into.
#[must_use]
pub fn chunk_count(len: u64) -> u64 {
    len.div_ceil(CHUNK_SIZE as u64)
}
