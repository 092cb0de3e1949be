//! Load, write-back and close-drain scheduling.
//!
//! All bookkeeping for one paged file lives in [`State`], guarded by a
//! single mutex in the handle. Every event (a new residency request, a claim
//! released, a physical read or write finished, close requested) updates the
//! state and then calls [`State::pump`], which returns the [`Actions`] to
//! carry out once the lock is released: claims to hand to waiters, at most
//! one physical read, at most one physical write, and possibly the close
//! result. `pump` never blocks and never performs I/O itself.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::frame::{Page, SlotId};
use super::guard::PageClaim;
use super::replacer::LruReplacer;
use super::table::PageTable;
use crate::error::{Error, Result};
use crate::storage::{PageBuf, PageGeometry, PageId, Storage, StorageError};

/// Receives the claim once the requested page is resident.
pub(crate) type Waiter<S> = oneshot::Sender<Result<PageClaim<S>>>;

/// A queued residency request.
pub(crate) struct LoadRequest<S: Storage> {
    pub page: PageId,
    pub waiter: Waiter<S>,
}

/// Close progress of a handle.
pub(crate) enum CloseState {
    Open,
    /// `close` was called; the sender fires once the drain completes.
    Draining(oneshot::Sender<Result<()>>),
    Closed,
}

/// Physical read of one page into `buf`.
pub(crate) struct ReadJob<S: Storage> {
    pub page: PageId,
    pub offset: u64,
    pub buf: PageBuf,
    pub waiter: Waiter<S>,
}

/// Physical write of the valid bytes of one page.
pub(crate) struct WriteJob {
    pub slot: SlotId,
    pub page: PageId,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Work decided under the lock, performed after it is released.
pub(crate) struct Actions<S: Storage> {
    pub resolved: Vec<(Waiter<S>, SlotId)>,
    pub read: Option<ReadJob<S>>,
    pub write: Option<WriteJob>,
    pub close: Option<(oneshot::Sender<Result<()>>, Result<()>)>,
}

impl<S: Storage> Default for Actions<S> {
    fn default() -> Self {
        Self {
            resolved: Vec::new(),
            read: None,
            write: None,
            close: None,
        }
    }
}

impl<S: Storage> Actions<S> {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
            && self.read.is_none()
            && self.write.is_none()
            && self.close.is_none()
    }
}

/// Mutable state of one paged file.
pub(crate) struct State<S: Storage> {
    pub geometry: PageGeometry,
    /// Maximum resident pages, counting a page whose read is in flight.
    pub capacity: usize,
    pub read_only: bool,
    /// Cursor used when an operation gives no position.
    pub pos: u64,
    /// Logical size in bytes.
    pub total_size: u64,
    /// Pages at or past this index have never reached storage.
    pub total_pages: u64,
    pub table: PageTable,
    /// Pages that may be evicted right now.
    lru: LruReplacer,
    /// Pages in the order they became dirty. Entries whose page was since
    /// flushed or evicted are skipped when popped.
    dirty_queue: VecDeque<(SlotId, PageId)>,
    dirty_count: usize,
    pub pending: VecDeque<LoadRequest<S>>,
    /// A physical read is in flight.
    pub reading: bool,
    /// A physical write is in flight.
    pub writing: bool,
    /// Logical operations between issue and completion.
    pub active_ops: usize,
    pub close: CloseState,
    /// First write-back failure. Sticky.
    pub error: Option<Arc<StorageError>>,
}

impl<S: Storage> State<S> {
    pub fn new(geometry: PageGeometry, capacity: usize, size: u64, read_only: bool) -> Self {
        Self {
            geometry,
            capacity,
            read_only,
            pos: 0,
            total_size: size,
            total_pages: geometry.page_count(size),
            table: PageTable::new(geometry.page_size(), capacity),
            lru: LruReplacer::new(capacity),
            dirty_queue: VecDeque::new(),
            dirty_count: 0,
            pending: VecDeque::new(),
            reading: false,
            writing: false,
            active_ops: 0,
            close: CloseState::Open,
            error: None,
        }
    }

    /// Fails once `close` has begun.
    pub fn check_open(&self) -> Result<()> {
        match self.close {
            CloseState::Open => Ok(()),
            _ => Err(Error::Closing),
        }
    }

    pub fn dirty_pages(&self) -> usize {
        self.dirty_count
    }

    /// Runs one scheduling pass.
    pub fn pump(&mut self) -> Actions<S> {
        let mut actions = Actions::default();
        self.schedule_loads(&mut actions);
        self.schedule_write(&mut actions);
        self.check_close(&mut actions);
        actions
    }

    /// Installs a page read from storage, claimed for the request that
    /// asked for it.
    pub fn install(&mut self, id: PageId, buf: PageBuf, size: usize) -> SlotId {
        self.reading = false;
        let slot = self.table.insert(Page::loaded(id, buf, size));
        tracing::trace!(page = id.page_num(), size, "page loaded");
        slot
    }

    /// Records a failed physical read. The page stays absent.
    pub fn abort_read(&mut self, buf: PageBuf) {
        self.reading = false;
        self.table.recycle(buf);
    }

    /// Records `len` bytes written at `offset` into the claimed page in
    /// `slot`.
    pub fn mark_written(&mut self, slot: SlotId, offset: usize, len: usize) {
        let lossy = self.lossy();
        let page = self.table.page_mut(slot);
        let id = page.id;
        if page.mark_written(offset, len) {
            self.dirty_count += 1;
            if !lossy {
                self.dirty_queue.push_back((slot, id));
            }
        }
        self.sync_evictable(slot);
    }

    /// Records the outcome of a write-back.
    pub fn finish_write(&mut self, slot: SlotId, result: Result<(), StorageError>) {
        self.writing = false;
        let page = self.table.page_mut(slot);
        page.flushing = false;
        let id = page.id;
        match result {
            Ok(()) => {
                tracing::trace!(page = id.page_num(), "page flushed");
            }
            Err(e) => {
                tracing::warn!(page = id.page_num(), error = %e, "write-back failed");
                if self.error.is_none() {
                    self.error = Some(Arc::new(e));
                    self.enter_lossy();
                }
            }
        }
        self.sync_evictable(slot);
    }

    /// Drops one claim on `slot`.
    pub fn release(&mut self, slot: SlotId) {
        if self.table.page_mut(slot).unpin() == 0 {
            self.sync_evictable(slot);
        }
    }

    fn lossy(&self) -> bool {
        self.error.is_some()
    }

    /// Keeps the replacer in step with the evictability of `slot`.
    fn sync_evictable(&mut self, slot: SlotId) {
        let evictable = self.table.page(slot).is_evictable(self.lossy());
        match (evictable, self.lru.contains(slot)) {
            (true, false) => self.lru.unpin(slot),
            (false, true) => self.lru.pin(slot),
            _ => {}
        }
    }

    /// Write-back has failed for good: unclaimed dirty pages become
    /// evictable and the write-back queue is abandoned.
    fn enter_lossy(&mut self) {
        self.dirty_queue.clear();
        let slots: Vec<SlotId> = self.table.iter().map(|(slot, _)| slot).collect();
        for slot in slots {
            self.sync_evictable(slot);
        }
    }

    /// Hands claims to every queued request whose page is resident.
    fn resolve_resident(&mut self, actions: &mut Actions<S>) {
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        while let Some(request) = self.pending.pop_front() {
            // Nobody is listening any more; do not load on their behalf.
            if request.waiter.is_closed() {
                continue;
            }
            match self.table.slot_of(request.page) {
                Some(slot) => {
                    self.table.page_mut(slot).pin();
                    if self.lru.contains(slot) {
                        self.lru.pin(slot);
                    }
                    actions.resolved.push((request.waiter, slot));
                }
                None => waiting.push_back(request),
            }
        }
        self.pending = waiting;
    }

    /// Frees one slot. Returns `false` if every resident page is claimed,
    /// dirty or mid-flush.
    fn evict_one(&mut self) -> bool {
        let Some(slot) = self.lru.evict() else {
            return false;
        };
        if self.table.page(slot).dirty {
            // Only reachable once write-back has failed; the bytes are lost.
            self.dirty_count -= 1;
        }
        let id = self.table.evict(slot);
        tracing::trace!(page = id.page_num(), "page evicted");
        true
    }

    fn schedule_loads(&mut self, actions: &mut Actions<S>) {
        loop {
            self.resolve_resident(actions);

            let Some(front) = self.pending.front() else {
                return;
            };
            let fresh = front.page.page_num() >= self.total_pages;

            // One physical read at a time; later requests wait behind it.
            if !fresh && self.reading {
                return;
            }

            let occupied = self.table.len() + usize::from(self.reading);
            if occupied >= self.capacity && !self.evict_one() {
                // Stall until a claim is released or a flush completes.
                return;
            }

            let Some(request) = self.pending.pop_front() else {
                return;
            };
            let buf = self.table.take_buf();

            if fresh {
                let slot = self.table.insert(Page::fresh(request.page, buf));
                actions.resolved.push((request.waiter, slot));
                continue;
            }

            self.reading = true;
            actions.read = Some(ReadJob {
                page: request.page,
                offset: self.geometry.byte_offset(request.page),
                buf,
                waiter: request.waiter,
            });
        }
    }

    fn schedule_write(&mut self, actions: &mut Actions<S>) {
        if self.writing || self.lossy() {
            return;
        }
        let Some(slot) = self.next_dirty() else {
            return;
        };

        let page = self.table.page_mut(slot);
        page.dirty = false;
        page.flushing = true;
        self.dirty_count -= 1;
        self.writing = true;

        actions.write = Some(WriteJob {
            slot,
            page: page.id,
            offset: self.geometry.byte_offset(page.id),
            data: page.buf.as_slice()[..page.size].to_vec(),
        });
    }

    /// Pops the oldest queued page that is still resident and dirty.
    fn next_dirty(&mut self) -> Option<SlotId> {
        while let Some((slot, id)) = self.dirty_queue.pop_front() {
            if self.table.slot_of(id) != Some(slot) {
                continue;
            }
            let page = self.table.page(slot);
            if page.dirty && !page.flushing {
                return Some(slot);
            }
        }
        None
    }

    fn is_drained(&self) -> bool {
        !self.reading
            && !self.writing
            && self.pending.is_empty()
            && self.active_ops == 0
            && self.dirty_count == 0
    }

    fn check_close(&mut self, actions: &mut Actions<S>) {
        if !matches!(self.close, CloseState::Draining(_)) {
            return;
        }
        let result = match &self.error {
            Some(e) => Err(Error::WriteBack(Arc::clone(e))),
            None if self.is_drained() => Ok(()),
            None => return,
        };
        if let CloseState::Draining(tx) = std::mem::replace(&mut self.close, CloseState::Closed) {
            actions.close = Some((tx, result));
        }
    }
}
