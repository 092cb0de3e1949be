//! Page-aligned memory allocation for cached pages.

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

/// OS page size for alignment (4KB is typical for x86_64).
///
/// Pages smaller than this are aligned to their own size instead.
const OS_PAGE_ALIGNMENT: usize = 4096;

/// Page-aligned, zero-initialized byte buffer of a runtime page size.
///
/// # Safety
///
/// This type uses `std::alloc` directly and maintains the following invariants:
/// - `ptr` is always valid and properly aligned
/// - Memory is allocated for exactly `layout.size()` bytes
/// - Memory is deallocated exactly once in `Drop`
pub struct PageBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl PageBuf {
    /// Allocates a zeroed buffer of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero. Aborts if allocation fails.
    pub fn zeroed(size: usize) -> Self {
        assert!(size > 0, "page buffer size must be > 0");
        let align = size.min(OS_PAGE_ALIGNMENT).next_power_of_two();
        let layout = Layout::from_size_align(size, align)
            .expect("page size and alignment should form a valid layout");

        // SAFETY: layout has non-zero size and a power-of-two alignment
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));

        Self { ptr, layout }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Resets every byte to zero so the buffer can back a different page.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for layout.size() bytes and we hold &mut self
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for PageBuf {
    fn drop(&mut self) {
        // SAFETY: ptr and layout match the values used in alloc_zeroed()
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

// PageBuf is Send because it owns its allocation
unsafe impl Send for PageBuf {}
// PageBuf is Sync because mutation requires &mut
unsafe impl Sync for PageBuf {}

impl std::fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuf").field("len", &self.len()).finish()
    }
}
