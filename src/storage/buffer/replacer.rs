//! Eviction candidates in least-recently-released order.

use super::frame::SlotId;

/// Neighbours of a slot in the eviction list.
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<SlotId>,
    next: Option<SlotId>,
    linked: bool,
}

/// LRU (Least Recently Used) page replacement policy.
///
/// Tracks only slots whose page may leave the cache. A slot enters at the
/// back when it becomes evictable (its last claim is released, or its flush
/// lands) and leaves when it is claimed, dirtied or evicted. The list is
/// threaded through a vector indexed by [`SlotId`], so every operation is
/// O(1).
///
/// # Usage Contract
///
/// - `unpin(slot)`: called when the page becomes evictable; the slot must
///   not already be tracked
/// - `pin(slot)`: called when the page stops being evictable; the slot must
///   be tracked
pub(crate) struct LruReplacer {
    links: Vec<Link>,
    /// Least recently released.
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            links: vec![Link::default(); capacity],
            head: None,
            tail: None,
        }
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.links.get(slot).is_some_and(|link| link.linked)
    }

    /// Appends `slot` as the most recently released candidate.
    pub fn unpin(&mut self, slot: SlotId) {
        debug_assert!(!self.contains(slot), "unpin called on slot already in replacer");
        if slot >= self.links.len() {
            self.links.resize(slot + 1, Link::default());
        }

        self.links[slot] = Link {
            prev: self.tail,
            next: None,
            linked: true,
        };
        match self.tail {
            Some(tail) => self.links[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    /// Removes `slot` from the candidates.
    pub fn pin(&mut self, slot: SlotId) {
        debug_assert!(self.contains(slot), "pin called on slot not in replacer");
        if !self.contains(slot) {
            return;
        }

        let Link { prev, next, .. } = std::mem::take(&mut self.links[slot]);
        match prev {
            Some(prev) => self.links[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.links[next].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Removes and returns the least recently released slot.
    pub fn evict(&mut self) -> Option<SlotId> {
        let slot = self.head?;
        self.pin(slot);
        Some(slot)
    }

    #[cfg(test)]
    pub fn size(&self) -> usize {
        self.links.iter().filter(|link| link.linked).count()
    }
}
