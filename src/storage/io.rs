//! Positional I/O backends underneath the page cache.
//!
//! This module provides the `Storage` trait for byte-offset I/O, along with
//! FileStorage and MemoryStorage implementations.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::storage::error::StorageError;

/// Raw positional I/O over a bounded storage resource.
///
/// The page cache is the only caller. It issues at most one `read_at` and one
/// `write_at` at a time per handle, always page-aligned and at most one page
/// long, so implementations need no internal scheduling of their own.
///
/// # Design Decisions
///
/// 1. **Async trait**: Uses return-position `impl Future + Send` so the page
///    cache can move physical I/O into spawned tokio tasks.
///
/// 2. **Caller-owned buffers**: Storage reads into and writes from buffers
///    owned by the page cache. It never allocates page memory itself.
///
/// 3. **Short reads are not errors**: reading at or past the end of the
///    resource returns the number of bytes actually available. The cache
///    records that count as the page's valid size.
///
/// 4. **No caching**: This layer does not cache anything.
pub trait Storage: Send + Sync + 'static {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than `buf.len()`
    /// only when the end of the resource is reached.
    fn read_at(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<usize, StorageError>> + Send;

    /// Writes all of `buf` starting at `offset`, extending the resource if
    /// needed. Gaps created by writing past the end read back as zeros.
    fn write_at(
        &self,
        offset: u64,
        buf: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Returns the current length of the resource in bytes.
    fn len(&self) -> impl std::future::Future<Output = Result<u64, StorageError>> + Send;

    /// Natural I/O block size of the resource.
    fn block_size(&self) -> u64;

    /// Releases the handle. Further I/O fails with `StorageError::Closed`.
    fn close(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Deletes the persistent backing. Called after `close`.
    fn remove(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}
