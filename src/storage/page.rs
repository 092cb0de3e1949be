//! Page identifiers, page sizing and byte-range decomposition.

mod data;

pub use data::PageBuf;

use crate::error::{Error, Result};

/// Smallest page size ever derived from a block size.
const MIN_PAGE_SIZE: usize = 1 << 8;

/// Pages are at least this many storage blocks long.
const BLOCKS_PER_PAGE: u64 = 4;

/// Index of a page within a file (`byte offset / page size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    pub const fn new(page_num: u64) -> Self {
        Self(page_num)
    }

    pub const fn page_num(&self) -> u64 {
        self.0
    }
}

/// Page size of an open file, fixed for the handle's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    page_size: usize,
}

impl PageGeometry {
    /// Uses `page_size` as is. It must be a non-zero power of two.
    pub fn new(page_size: usize) -> Result<Self> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "page size must be a power of two, got {page_size}"
            )));
        }
        Ok(Self { page_size })
    }

    /// Picks the page size for a storage resource.
    ///
    /// An explicit override wins. Otherwise the page size is the smallest
    /// power of two that is at least `MIN_PAGE_SIZE` and at least four
    /// storage blocks.
    pub fn derive(block_size: u64, page_size: Option<usize>) -> Result<Self> {
        if let Some(size) = page_size {
            return Self::new(size);
        }
        let mut size = MIN_PAGE_SIZE;
        while (size as u64) < block_size.saturating_mul(BLOCKS_PER_PAGE) {
            size *= 2;
        }
        Ok(Self { page_size: size })
    }

    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Byte offset of the first byte of `page`.
    pub const fn byte_offset(&self, page: PageId) -> u64 {
        page.0 * self.page_size as u64
    }

    /// Number of pages needed to hold `size` bytes.
    pub const fn page_count(&self, size: u64) -> u64 {
        size.div_ceil(self.page_size as u64)
    }

    /// Splits `len` bytes at `pos` into per-page spans.
    pub fn spans(&self, pos: u64, len: usize) -> Spans {
        Spans::new(self.page_size, pos, len)
    }
}

/// Part of a byte range that falls inside one fixed-size chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Chunk index (page or segment).
    pub index: u64,
    /// Offset within the chunk.
    pub offset: usize,
    /// Number of bytes in this chunk.
    pub len: usize,
    /// Offset of this span within the caller's buffer.
    pub done: usize,
}

impl Span {
    /// Range of the caller's buffer covered by this span.
    pub fn buf_range(&self) -> std::ops::Range<usize> {
        self.done..self.done + self.len
    }

    /// Range of the chunk covered by this span.
    pub fn chunk_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Iterator decomposing a byte range into chunk-local spans.
///
/// Chunk `index = offset / chunk_size`, `sub_offset = offset % chunk_size`.
/// Shared by the page cache and the segmented memory backend.
#[derive(Debug, Clone)]
pub struct Spans {
    chunk_size: usize,
    pos: u64,
    remaining: usize,
    done: usize,
}

impl Spans {
    pub fn new(chunk_size: usize, pos: u64, len: usize) -> Self {
        debug_assert!(chunk_size > 0, "chunk size must be > 0");
        Self {
            chunk_size,
            pos,
            remaining: len,
            done: 0,
        }
    }
}

impl Iterator for Spans {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.remaining == 0 {
            return None;
        }
        let chunk = self.chunk_size as u64;
        let index = self.pos / chunk;
        let offset = (self.pos % chunk) as usize;
        let len = self.remaining.min(self.chunk_size - offset);

        let span = Span {
            index,
            offset,
            len,
            done: self.done,
        };
        self.pos += len as u64;
        self.remaining -= len;
        self.done += len;
        Some(span)
    }
}
