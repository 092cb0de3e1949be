//! File-backed page cache handle.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use super::guard::{ActiveOp, PageClaim};
use super::scheduler::{Actions, CloseState, LoadRequest, ReadJob, State, Waiter, WriteJob};
use crate::access::{AccessMode, RandomAccess};
use crate::error::{Error, Result};
use crate::storage::{FileStorage, PageBuf, PageGeometry, PageId, Storage, StorageError};

/// Default cache budget: 64 blocks of 4 KiB.
pub const DEFAULT_CACHE_BUDGET: usize = 4096 * 64;

/// Configuration for a [`PagedFile`].
#[derive(Debug, Clone)]
pub struct PagedConfig {
    /// Target bytes of resident page memory.
    ///
    /// The page capacity is `cache_budget / page_size + 1`, so at least one
    /// page is always cacheable.
    pub cache_budget: usize,

    /// Page size override. Must be a power of two.
    ///
    /// When `None` the page size is the smallest power of two that is at
    /// least four storage blocks.
    pub page_size: Option<usize>,
}

impl Default for PagedConfig {
    fn default() -> Self {
        Self {
            cache_budget: DEFAULT_CACHE_BUDGET,
            page_size: None,
        }
    }
}

impl PagedConfig {
    /// Number of pages that fit in the budget.
    pub fn capacity(&self, page_size: usize) -> usize {
        self.cache_budget / page_size + 1
    }

    /// Rejects an invalid page size override before anything is opened.
    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.page_size {
            PageGeometry::new(size)?;
        }
        Ok(())
    }
}

/// A paged, cached view of a storage resource.
///
/// Logical reads and writes are split at page boundaries. Each part waits
/// for its page to become resident, copies bytes while holding a claim on
/// the page, and releases the claim before moving on to the next page, so
/// an operation never holds more than one claim at a time.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// | write / read_into |   logical operations (many in flight)
/// +-------------------+
///          |  acquire(page)
///          v
/// +-------------------+     +---------------------+
/// | State::pump       |---->| page table (arena)  |
/// | (scheduler)       |     | LRU + dirty queue   |
/// +-------------------+     +---------------------+
///          |  at most one read job + one write job
///          v
/// +-------------------+
/// |  Storage (trait)  |
/// +-------------------+
/// ```
///
/// # Ordering
///
/// Two operations awaited one after the other observe last-writer-wins.
/// Operations issued concurrently on overlapping ranges have no defined
/// relative order: page claims count concurrent users but do not exclude
/// them. Callers that need ordering must serialize conflicting accesses.
///
/// # Backpressure
///
/// When the cache is full and every resident page is claimed, dirty or
/// mid-flush, new loads wait. Dirty pages are written back and become
/// evictable; claims are short-lived because no operation holds more than
/// one. The cache never grows past its capacity to make progress.
pub struct PagedFile<S: Storage = FileStorage> {
    shared: Arc<Shared<S>>,
}

/// State shared between the handle, its guards and spawned I/O tasks.
pub(crate) struct Shared<S: Storage> {
    storage: S,
    geometry: PageGeometry,
    state: Mutex<State<S>>,
    runtime: Handle,
}

impl PagedFile<FileStorage> {
    /// Opens `path` with the open semantics of `mode`.
    pub async fn open(
        path: impl Into<PathBuf>,
        mode: AccessMode,
        config: PagedConfig,
    ) -> Result<Self> {
        config.validate()?;
        let storage = FileStorage::open(path, mode).await?;
        Self::with_storage(storage, mode.is_read_only(), config).await
    }
}

impl<S: Storage> PagedFile<S> {
    /// Wraps an already opened storage resource.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the page size override is invalid or no tokio
    ///   runtime is running
    /// - `Error::Storage` if the storage length cannot be read
    pub async fn with_storage(storage: S, read_only: bool, config: PagedConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::Config("paged files require a tokio runtime".into()))?;
        let geometry = PageGeometry::derive(storage.block_size(), config.page_size)?;
        let capacity = config.capacity(geometry.page_size());
        let size = storage.len().await?;

        tracing::debug!(
            page_size = geometry.page_size(),
            capacity,
            size,
            read_only,
            "paged file opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                storage,
                geometry,
                state: Mutex::new(State::new(geometry, capacity, size, read_only)),
                runtime,
            }),
        })
    }

    pub fn page_size(&self) -> usize {
        self.shared.geometry.page_size()
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.shared.state.lock().table.len()
    }

    /// Number of resident pages holding unflushed bytes.
    pub fn dirty_pages(&self) -> usize {
        self.shared.state.lock().dirty_pages()
    }

    /// The underlying storage resource.
    pub fn storage(&self) -> &S {
        &self.shared.storage
    }
}

impl<S: Storage> RandomAccess for PagedFile<S> {
    async fn write(&self, data: &[u8], pos: Option<u64>) -> Result<()> {
        let (start, _op) = {
            let mut state = self.shared.state.lock();
            state.check_open()?;
            if state.read_only {
                return Err(Error::ReadOnly);
            }
            if let Some(e) = &state.error {
                return Err(Error::WriteBack(Arc::clone(e)));
            }
            if data.is_empty() {
                return Ok(());
            }

            let start = pos.unwrap_or(state.pos);
            let end = start.checked_add(data.len() as u64).ok_or(Error::OutOfBounds {
                pos: start,
                len: data.len(),
                size: state.total_size,
            })?;
            state.pos = end;
            state.total_size = state.total_size.max(end);
            state.active_ops += 1;
            (start, ActiveOp::new(Arc::clone(&self.shared)))
        };

        for span in self.shared.geometry.spans(start, data.len()) {
            let claim = self.shared.acquire(PageId::new(span.index)).await?;
            {
                let mut state = self.shared.state.lock();
                state.table.page_mut(claim.slot()).buf.as_mut_slice()[span.chunk_range()]
                    .copy_from_slice(&data[span.buf_range()]);
                state.mark_written(claim.slot(), span.offset, span.len);
                if span.index >= state.total_pages {
                    state.total_pages = span.index + 1;
                }
            }
            drop(claim);
        }

        Ok(())
    }

    async fn read_into(&self, dst: &mut [u8], pos: Option<u64>) -> Result<()> {
        let len = dst.len();
        let (start, avail, _op) = {
            let mut state = self.shared.state.lock();
            state.check_open()?;
            if len == 0 {
                return Ok(());
            }

            let start = pos.unwrap_or(state.pos);
            let end = start.checked_add(len as u64).ok_or(Error::OutOfBounds {
                pos: start,
                len,
                size: state.total_size,
            })?;
            if state.read_only && end > state.total_size {
                return Err(Error::OutOfBounds {
                    pos: start,
                    len,
                    size: state.total_size,
                });
            }
            state.pos = end;
            state.active_ops += 1;

            // Writable handles clamp at end of file
            let avail = state.total_size.saturating_sub(start).min(len as u64) as usize;
            (start, avail, ActiveOp::new(Arc::clone(&self.shared)))
        };

        dst[avail..].fill(0);

        for span in self.shared.geometry.spans(start, avail) {
            let claim = self.shared.acquire(PageId::new(span.index)).await?;
            {
                let state = self.shared.state.lock();
                let page = state.table.page(claim.slot());
                dst[span.buf_range()].copy_from_slice(&page.buf.as_slice()[span.chunk_range()]);
            }
            drop(claim);
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let (rx, actions) = {
            let mut state = self.shared.state.lock();
            if !matches!(state.close, CloseState::Open) {
                return Err(Error::AlreadyClosed);
            }
            let (tx, rx) = oneshot::channel();
            state.close = CloseState::Draining(tx);
            (rx, state.pump())
        };
        self.shared.dispatch(actions);

        let drained = rx
            .await
            .unwrap_or_else(|_| Err(Error::Storage(Arc::new(StorageError::Closed))));
        let released = self.shared.storage.close().await;

        drained?;
        released?;
        tracing::debug!("paged file closed");
        Ok(())
    }

    async fn discard(&self) -> Result<()> {
        self.close().await?;
        self.shared.storage.remove().await?;
        tracing::debug!("paged file discarded");
        Ok(())
    }

    fn position(&self) -> u64 {
        self.shared.state.lock().pos
    }

    fn set_position(&self, pos: u64) {
        self.shared.state.lock().pos = pos;
    }

    fn size(&self) -> u64 {
        self.shared.state.lock().total_size
    }
}

impl<S: Storage> Drop for PagedFile<S> {
    fn drop(&mut self) {
        let state = self.shared.state.lock();
        if matches!(state.close, CloseState::Open) {
            // Pending write-backs still run on the runtime; nothing awaits them.
            tracing::warn!(
                dirty_pages = state.dirty_pages(),
                "paged file dropped without close"
            );
        }
    }
}

impl<S: Storage> Shared<S> {
    /// Waits until `page` is resident and returns a claim on it.
    async fn acquire(self: &Arc<Self>, page: PageId) -> Result<PageClaim<S>> {
        let (tx, rx) = oneshot::channel();
        let actions = {
            let mut state = self.state.lock();
            state.pending.push_back(LoadRequest { page, waiter: tx });
            state.pump()
        };
        self.dispatch(actions);

        rx.await
            .map_err(|_| Error::Storage(Arc::new(StorageError::Closed)))?
    }

    /// Drops one claim on `slot` (called by `PageClaim::drop`).
    pub(super) fn release(self: &Arc<Self>, slot: usize) {
        let actions = {
            let mut state = self.state.lock();
            state.release(slot);
            state.pump()
        };
        self.dispatch(actions);
    }

    /// Ends one logical operation (called by `ActiveOp::drop`).
    pub(super) fn finish_op(self: &Arc<Self>) {
        let actions = {
            let mut state = self.state.lock();
            state.active_ops -= 1;
            state.pump()
        };
        self.dispatch(actions);
    }

    /// Carries out scheduler decisions. Must be called without the lock.
    fn dispatch(self: &Arc<Self>, actions: Actions<S>) {
        if actions.is_empty() {
            return;
        }
        for (waiter, slot) in actions.resolved {
            send_claim(waiter, PageClaim::new(Arc::clone(self), slot));
        }
        if let Some(job) = actions.read {
            self.spawn_read(job);
        }
        if let Some(job) = actions.write {
            self.spawn_write(job);
        }
        if let Some((tx, result)) = actions.close {
            let _ = tx.send(result);
        }
    }

    fn spawn_read(self: &Arc<Self>, job: ReadJob<S>) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let ReadJob {
                page,
                offset,
                mut buf,
                waiter,
            } = job;
            let result = shared.storage.read_at(offset, buf.as_mut_slice()).await;
            shared.complete_read(page, buf, waiter, result);
        });
    }

    fn complete_read(
        self: &Arc<Self>,
        page: PageId,
        buf: PageBuf,
        waiter: Waiter<S>,
        result: Result<usize, StorageError>,
    ) {
        match result {
            Ok(size) => {
                let (slot, actions) = {
                    let mut state = self.state.lock();
                    let slot = state.install(page, buf, size);
                    (slot, state.pump())
                };
                self.dispatch(actions);
                send_claim(waiter, PageClaim::new(Arc::clone(self), slot));
            }
            Err(e) => {
                tracing::warn!(page = page.page_num(), error = %e, "page read failed");
                let actions = {
                    let mut state = self.state.lock();
                    state.abort_read(buf);
                    state.pump()
                };
                self.dispatch(actions);
                let _ = waiter.send(Err(e.into()));
            }
        }
    }

    fn spawn_write(self: &Arc<Self>, job: WriteJob) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tracing::trace!(page = job.page.page_num(), len = job.data.len(), "flushing page");
            let result = shared.storage.write_at(job.offset, &job.data).await;
            let actions = {
                let mut state = shared.state.lock();
                state.finish_write(job.slot, result);
                state.pump()
            };
            shared.dispatch(actions);
        });
    }
}

/// Hands a claim to its waiter.
///
/// If the waiter is gone the claim comes back inside the send error and is
/// dropped here, which releases the page.
fn send_claim<S: Storage>(waiter: Waiter<S>, claim: PageClaim<S>) {
    let _ = waiter.send(Ok(claim));
}
