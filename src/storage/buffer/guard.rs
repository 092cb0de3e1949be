//! RAII guards for page claims and in-progress operations.
//!
//! Guards release what they hold when dropped, so a logical operation that
//! fails halfway or is cancelled by its caller can never leave a page
//! claimed or a close waiting forever.

use std::sync::Arc;

use super::frame::SlotId;
use super::paged::Shared;
use crate::storage::Storage;

/// A claim on a resident page.
///
/// While the claim lives the page cannot be evicted, so its slot stays
/// valid. Dropping the claim decrements the page's `pending_ops` and
/// re-runs the scheduler.
///
/// Never drop a claim while holding the state lock.
pub(crate) struct PageClaim<S: Storage> {
    shared: Arc<Shared<S>>,
    slot: SlotId,
}

impl<S: Storage> PageClaim<S> {
    pub(super) fn new(shared: Arc<Shared<S>>, slot: SlotId) -> Self {
        Self { shared, slot }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl<S: Storage> Drop for PageClaim<S> {
    fn drop(&mut self) {
        self.shared.release(self.slot);
    }
}

/// Marks a logical operation as in progress until dropped.
///
/// `close` does not complete while any operation is in progress.
pub(crate) struct ActiveOp<S: Storage> {
    shared: Arc<Shared<S>>,
}

impl<S: Storage> ActiveOp<S> {
    /// Call with the state lock held and `active_ops` already incremented.
    pub(super) fn new(shared: Arc<Shared<S>>) -> Self {
        Self { shared }
    }
}

impl<S: Storage> Drop for ActiveOp<S> {
    fn drop(&mut self) {
        self.shared.finish_op();
    }
}
