//! Resident page state.

use crate::storage::{PageBuf, PageId};

/// Identifier for a slot within the page table arena.
///
/// SlotId is an index into the table's slot array and is reused after the
/// page occupying it is evicted.
pub(crate) type SlotId = usize;

/// A resident page: its bytes plus cache metadata.
#[derive(Debug)]
pub(crate) struct Page {
    /// Which page of the file this is.
    pub id: PageId,
    /// Page-sized buffer. Bytes past `size` are zero.
    pub buf: PageBuf,
    /// Holds bytes not yet flushed to storage.
    pub dirty: bool,
    /// Count of valid bytes. Only the last or a sparse page is partial.
    pub size: usize,
    /// Logical operations holding a claim on this page.
    pub pending_ops: u32,
    /// A write-back of this page is in flight.
    pub flushing: bool,
}

impl Page {
    /// A page loaded from storage with `size` valid bytes, claimed once.
    pub fn loaded(id: PageId, buf: PageBuf, size: usize) -> Self {
        Self {
            id,
            buf,
            dirty: false,
            size,
            pending_ops: 1,
            flushing: false,
        }
    }

    /// A page past the end of storage, zeroed and claimed once.
    pub fn fresh(id: PageId, buf: PageBuf) -> Self {
        Self::loaded(id, buf, 0)
    }

    /// Whether the page may leave the cache.
    ///
    /// Claimed pages and pages mid-flush never qualify. Dirty pages qualify
    /// only once write-back has failed for good (`lossy`).
    pub fn is_evictable(&self, lossy: bool) -> bool {
        self.pending_ops == 0 && !self.flushing && (!self.dirty || lossy)
    }

    /// Records `len` bytes written at `offset`. Returns whether the page
    /// was clean before.
    pub fn mark_written(&mut self, offset: usize, len: usize) -> bool {
        let was_clean = !self.dirty;
        self.dirty = true;
        self.size = self.size.max(offset + len);
        was_clean
    }

    pub fn pin(&mut self) {
        self.pending_ops += 1;
    }

    /// Drops one claim. Returns the remaining count.
    pub fn unpin(&mut self) -> u32 {
        debug_assert!(self.pending_ops > 0, "unpin called on unclaimed page");
        self.pending_ops = self.pending_ops.saturating_sub(1);
        self.pending_ops
    }
}
