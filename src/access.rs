//! The uniform random-access contract shared by every backend.

use std::future::Future;

use crate::error::{Error, Result};

/// Bytes fetched per step while scanning for a string terminator.
const STRING_CHUNK: usize = 64;

/// How a handle opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Create the target, truncating any existing contents.
    CreateOverwrite,
    /// Create the target; fail if it already exists.
    CreateExclusive,
    /// Open an existing target for reading only.
    ReadOnly,
    /// Open an existing target for reading and writing, creating it if absent.
    ReadWriteOrCreate,
    /// Open an existing target for reading and writing; fail if absent.
    ReadWriteExisting,
}

impl AccessMode {
    pub const fn is_read_only(self) -> bool {
        matches!(self, AccessMode::ReadOnly)
    }

    /// Whether the handle starts from an empty target regardless of what
    /// exists.
    pub const fn is_create(self) -> bool {
        matches!(self, AccessMode::CreateOverwrite | AccessMode::CreateExclusive)
    }
}

/// Byte-addressable storage with a cursor.
///
/// All methods take `&self`, so several logical operations may be in flight
/// on one handle at once. Operations that omit `pos` use the cursor and
/// advance it past the bytes they cover; the cursor moves when the
/// operation is issued, not when it completes.
///
/// Operations on overlapping ranges that are not awaited one after the
/// other have no defined relative order.
pub trait RandomAccess: Send + Sync {
    /// Writes `data` at `pos` (default: cursor), growing the logical size
    /// if the write ends past it.
    ///
    /// # Errors
    ///
    /// - `Error::ReadOnly` on a read-only handle
    /// - `Error::Closing` once `close` has begun
    fn write(&self, data: &[u8], pos: Option<u64>) -> impl Future<Output = Result<()>> + Send;

    /// Fills `dst` with the bytes at `pos` (default: cursor).
    ///
    /// # Errors
    ///
    /// - `Error::OutOfBounds` if the range ends past the logical size of a
    ///   read-only handle; writable handles zero-fill instead
    /// - `Error::Closing` once `close` has begun
    fn read_into(&self, dst: &mut [u8], pos: Option<u64>)
    -> impl Future<Output = Result<()>> + Send;

    /// Flushes and releases the handle.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyClosed` on a second call
    /// - `Error::WriteBack` if unflushed data was lost
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the handle and deletes its persistent backing, if any.
    fn discard(&self) -> impl Future<Output = Result<()>> + Send;

    /// Current cursor.
    fn position(&self) -> u64;

    fn set_position(&self, pos: u64);

    /// Logical size in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `len` bytes at `pos` (default: cursor).
    fn read(&self, len: usize, pos: Option<u64>) -> impl Future<Output = Result<Vec<u8>>> + Send {
        async move {
            let mut buf = vec![0u8; len];
            self.read_into(&mut buf, pos).await?;
            Ok(buf)
        }
    }

    fn write_u32_le(&self, value: u32, pos: Option<u64>) -> impl Future<Output = Result<()>> + Send {
        async move { self.write(&value.to_le_bytes(), pos).await }
    }

    fn write_u32_be(&self, value: u32, pos: Option<u64>) -> impl Future<Output = Result<()>> + Send {
        async move { self.write(&value.to_be_bytes(), pos).await }
    }

    /// Writes the low 32 bits then the high 32 bits, each little-endian.
    fn write_u64_le(&self, value: u64, pos: Option<u64>) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut buf = [0u8; 8];
            buf[..4].copy_from_slice(&(value as u32).to_le_bytes());
            buf[4..].copy_from_slice(&((value >> 32) as u32).to_le_bytes());
            self.write(&buf, pos).await
        }
    }

    fn read_u32_le(&self, pos: Option<u64>) -> impl Future<Output = Result<u32>> + Send {
        async move {
            let mut buf = [0u8; 4];
            self.read_into(&mut buf, pos).await?;
            Ok(u32::from_le_bytes(buf))
        }
    }

    fn read_u32_be(&self, pos: Option<u64>) -> impl Future<Output = Result<u32>> + Send {
        async move {
            let mut buf = [0u8; 4];
            self.read_into(&mut buf, pos).await?;
            Ok(u32::from_be_bytes(buf))
        }
    }

    fn read_u64_le(&self, pos: Option<u64>) -> impl Future<Output = Result<u64>> + Send {
        async move {
            let mut lo = [0u8; 4];
            let mut hi = [0u8; 4];
            let mut buf = [0u8; 8];
            self.read_into(&mut buf, pos).await?;
            lo.copy_from_slice(&buf[..4]);
            hi.copy_from_slice(&buf[4..]);
            Ok(u64::from(u32::from_le_bytes(lo)) | (u64::from(u32::from_le_bytes(hi)) << 32))
        }
    }

    /// Reads a NUL-terminated UTF-8 string at `pos` (default: cursor) and
    /// leaves the cursor just past the terminator.
    ///
    /// Writable handles read zeros past the logical size, so a string that
    /// runs off the end stops there.
    ///
    /// # Errors
    ///
    /// - `Error::OutOfBounds` if `pos` is at or past the logical size of a
    ///   read-only handle
    /// - `Error::UnterminatedString` if a read-only handle ends before the
    ///   terminator
    /// - `Error::InvalidString` if the bytes are not UTF-8; the cursor still
    ///   moves past the terminator
    fn read_string(&self, pos: Option<u64>) -> impl Future<Output = Result<String>> + Send {
        async move {
            let start = pos.unwrap_or_else(|| self.position());
            let mut bytes = Vec::new();
            let mut at = start;
            let mut chunk = [0u8; STRING_CHUNK];

            loop {
                // At the end a one-byte read either fails (read-only) or
                // yields the zero that ends the string (writable)
                let remaining = self.size().saturating_sub(at);
                let len = remaining.clamp(1, STRING_CHUNK as u64) as usize;
                let chunk = &mut chunk[..len];

                match self.read_into(chunk, Some(at)).await {
                    Ok(()) => {}
                    Err(Error::OutOfBounds { .. }) if at > start => {
                        return Err(Error::UnterminatedString { pos: start });
                    }
                    Err(e) => return Err(e),
                }

                if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                    bytes.extend_from_slice(&chunk[..nul]);
                    at += nul as u64 + 1;
                    break;
                }
                bytes.extend_from_slice(chunk);
                at += len as u64;
            }

            self.set_position(at);
            String::from_utf8(bytes).map_err(|source| Error::InvalidString { pos: start, source })
        }
    }
}
