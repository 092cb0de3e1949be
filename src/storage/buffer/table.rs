//! Arena page table with slot and buffer reuse.

use std::collections::HashMap;

use super::frame::{Page, SlotId};
use crate::storage::{PageBuf, PageId};

/// Resident pages, addressed by slot.
///
/// Pages live in a slot arena indexed by [`SlotId`]; a hash map translates
/// page numbers to slots. Evicted slots go on a free list and evicted page
/// buffers on a spare list, so a steady-state cache allocates nothing.
pub(crate) struct PageTable {
    page_size: usize,
    index: HashMap<PageId, SlotId>,
    slots: Vec<Option<Page>>,
    free_slots: Vec<SlotId>,
    spare_bufs: Vec<PageBuf>,
}

impl PageTable {
    pub fn new(page_size: usize, capacity: usize) -> Self {
        Self {
            page_size,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            spare_bufs: Vec::new(),
        }
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn slot_of(&self, id: PageId) -> Option<SlotId> {
        self.index.get(&id).copied()
    }

    /// # Panics
    ///
    /// Panics if `slot` is empty; callers only hold slots of resident pages.
    pub fn page(&self, slot: SlotId) -> &Page {
        self.slots[slot].as_ref().expect("slot holds a resident page")
    }

    /// # Panics
    ///
    /// Panics if `slot` is empty.
    pub fn page_mut(&mut self, slot: SlotId) -> &mut Page {
        self.slots[slot].as_mut().expect("slot holds a resident page")
    }

    /// Installs `page` and returns its slot.
    pub fn insert(&mut self, page: Page) -> SlotId {
        debug_assert!(!self.index.contains_key(&page.id), "page already resident");
        let id = page.id;
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(page);
                slot
            }
            None => {
                self.slots.push(Some(page));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        slot
    }

    /// Removes the page in `slot`, keeping its buffer for reuse.
    pub fn evict(&mut self, slot: SlotId) -> PageId {
        let page = self.slots[slot].take().expect("slot holds a resident page");
        self.index.remove(&page.id);
        self.free_slots.push(slot);
        self.spare_bufs.push(page.buf);
        page.id
    }

    /// A zeroed page buffer, reused from an evicted page when possible.
    pub fn take_buf(&mut self) -> PageBuf {
        match self.spare_bufs.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => PageBuf::zeroed(self.page_size),
        }
    }

    /// Returns an unused buffer to the spare list.
    pub fn recycle(&mut self, buf: PageBuf) {
        self.spare_bufs.push(buf);
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Page)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, page)| page.as_ref().map(|p| (slot, p)))
    }
}
