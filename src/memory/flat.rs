//! Contiguous in-memory backend.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use super::{DEFAULT_INITIAL_SIZE, GROWTH_STEP};
use crate::access::RandomAccess;
use crate::error::{Error, Result};

/// One contiguous buffer that grows geometrically.
///
/// The allocation grows to `max(current + 1 MiB, current * 1.1, required)`
/// whenever a write, or a read on a writable handle, reaches past it. The
/// logical size only grows through writes. `close` trims the allocation to
/// the logical size.
#[derive(Debug)]
pub struct FlatBuffer {
    inner: Mutex<FlatState>,
}

#[derive(Debug)]
struct FlatState {
    /// Zero-filled past `size`; `buf.len()` is the allocation.
    buf: BytesMut,
    size: u64,
    pos: u64,
    read_only: bool,
    closed: bool,
}

impl FlatBuffer {
    /// An empty writable buffer with `initial_size` bytes allocated.
    pub fn new(initial_size: usize) -> Self {
        Self::from_state(BytesMut::zeroed(initial_size), 0, false)
    }

    /// A buffer holding `data`.
    pub fn from_bytes(data: Bytes, read_only: bool) -> Self {
        let size = data.len() as u64;
        Self::from_state(BytesMut::from(&data[..]), size, read_only)
    }

    fn from_state(buf: BytesMut, size: u64, read_only: bool) -> Self {
        Self {
            inner: Mutex::new(FlatState {
                buf,
                size,
                pos: 0,
                read_only,
                closed: false,
            }),
        }
    }

    /// Bytes currently allocated.
    pub fn allocated(&self) -> usize {
        self.inner.lock().buf.len()
    }

    /// The logical contents. Typically called after `close`.
    pub fn into_bytes(self) -> Bytes {
        let mut state = self.inner.into_inner();
        state.buf.truncate(state.size as usize);
        state.buf.freeze()
    }
}

impl Default for FlatBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SIZE)
    }
}

impl FlatState {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closing);
        }
        Ok(())
    }

    fn reserve(&mut self, required: usize) {
        let current = self.buf.len();
        if required <= current {
            return;
        }
        let grown = current + current / 10;
        let target = (current + GROWTH_STEP).max(grown).max(required);
        tracing::trace!(from = current, to = target, "flat buffer grown");
        self.buf.resize(target, 0);
    }
}

impl RandomAccess for FlatBuffer {
    async fn write(&self, data: &[u8], pos: Option<u64>) -> Result<()> {
        let mut state = self.inner.lock();
        state.check_open()?;
        if state.read_only {
            return Err(Error::ReadOnly);
        }
        if data.is_empty() {
            return Ok(());
        }

        let start = pos.unwrap_or(state.pos);
        let end = start.checked_add(data.len() as u64).ok_or(Error::OutOfBounds {
            pos: start,
            len: data.len(),
            size: state.size,
        })?;
        state.reserve(end as usize);
        state.buf[start as usize..end as usize].copy_from_slice(data);
        state.pos = end;
        state.size = state.size.max(end);
        Ok(())
    }

    async fn read_into(&self, dst: &mut [u8], pos: Option<u64>) -> Result<()> {
        let mut state = self.inner.lock();
        state.check_open()?;

        let start = pos.unwrap_or(state.pos);
        let end = start.checked_add(dst.len() as u64).ok_or(Error::OutOfBounds {
            pos: start,
            len: dst.len(),
            size: state.size,
        })?;
        if state.read_only {
            if end > state.size {
                return Err(Error::OutOfBounds {
                    pos: start,
                    len: dst.len(),
                    size: state.size,
                });
            }
        } else {
            state.reserve(end as usize);
        }

        // Bytes past the logical size are zero in the allocation
        let avail = state.buf.len().saturating_sub(start as usize).min(dst.len());
        dst[..avail].copy_from_slice(&state.buf[start as usize..start as usize + avail]);
        dst[avail..].fill(0);
        state.pos = end;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(Error::AlreadyClosed);
        }
        state.closed = true;
        let size = state.size as usize;
        state.buf.truncate(size);
        Ok(())
    }

    async fn discard(&self) -> Result<()> {
        let mut state = self.inner.lock();
        state.closed = true;
        state.size = 0;
        state.buf = BytesMut::new();
        Ok(())
    }

    fn position(&self) -> u64 {
        self.inner.lock().pos
    }

    fn set_position(&self, pos: u64) {
        self.inner.lock().pos = pos;
    }

    fn size(&self) -> u64 {
        self.inner.lock().size
    }
}
