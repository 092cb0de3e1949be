//! In-memory positional storage.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Storage;
use crate::storage::error::StorageError;

/// In-memory storage for tests and for caching over a byte vector.
///
/// Cloning yields another handle onto the same bytes, which lets a test keep
/// inspecting the contents after the page cache that owns the storage has
/// been closed. Failures can be armed with [`fail_reads`](Self::fail_reads)
/// and [`fail_writes`](Self::fail_writes) to drive error paths.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryState>>,
    block_size: u64,
}

struct MemoryState {
    data: Vec<u8>,
    closed: bool,
    removed: bool,
    /// Number of upcoming reads that fail.
    failing_reads: usize,
    /// Whether writes fail.
    failing_writes: bool,
    reads: usize,
    writes: usize,
}

impl MemoryStorage {
    /// Creates an empty storage reporting a 512-byte block size.
    pub fn new() -> Self {
        Self::with_data(Vec::new())
    }

    /// Creates a storage holding `data`.
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                data,
                closed: false,
                removed: false,
                failing_reads: 0,
                failing_writes: false,
                reads: 0,
                writes: 0,
            })),
            block_size: 512,
        }
    }

    /// Overrides the reported block size.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Makes the next `count` reads fail.
    pub fn fail_reads(&self, count: usize) {
        self.inner.lock().failing_reads = count;
    }

    /// Makes every write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().failing_writes = fail;
    }

    /// Snapshot of the stored bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Number of physical reads served so far.
    pub fn read_count(&self) -> usize {
        self.inner.lock().reads
    }

    /// Number of physical writes served so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(StorageError::Injected("read"));
        }
        state.reads += 1;

        let len = state.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        Ok(n)
    }

    async fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if state.failing_writes {
            return Err(StorageError::Injected("write"));
        }
        state.writes += 1;

        let start = offset as usize;
        let end = start + buf.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    async fn len(&self) -> Result<u64, StorageError> {
        Ok(self.inner.lock().data.len() as u64)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.lock().closed = true;
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        state.data = Vec::new();
        state.removed = true;
        Ok(())
    }
}
