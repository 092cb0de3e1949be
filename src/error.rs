//! Errors surfaced through the uniform file contract.

use std::sync::Arc;

use thiserror::Error;

use crate::storage::StorageError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type shared by every backend.
///
/// Variants map onto four families:
/// - configuration: [`Error::Config`], raised synchronously at construction
/// - protocol violations: [`Error::Closing`], [`Error::AlreadyClosed`],
///   [`Error::ReadOnly`]; these are caller bugs and are never retried
/// - bounds: [`Error::OutOfBounds`]
/// - string decoding: [`Error::UnterminatedString`], [`Error::InvalidString`]
/// - physical I/O: [`Error::Storage`] for a failed page load (scoped to the
///   one request that triggered it) and [`Error::WriteBack`] for a failed
///   flush, which is sticky for the lifetime of the handle
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid backend kind / access mode combination or parameter.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation issued after `close` has begun.
    #[error("file is closing")]
    Closing,

    /// `close` called twice on the same handle.
    #[error("file closed twice")]
    AlreadyClosed,

    /// Write issued against a read-only handle.
    #[error("writing a read-only file")]
    ReadOnly,

    /// Read past the logical size of a read-only handle.
    #[error("reading out of bounds: {len} bytes at {pos}, size is {size}")]
    OutOfBounds { pos: u64, len: usize, size: u64 },

    /// No NUL terminator before the end of a read-only handle.
    #[error("string at {pos} has no terminator before end of file")]
    UnterminatedString { pos: u64 },

    /// String bytes are not valid UTF-8.
    #[error("string at {pos} is not valid UTF-8")]
    InvalidString {
        pos: u64,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Physical read failure while loading a page.
    #[error("storage error: {0}")]
    Storage(Arc<StorageError>),

    /// Physical write-back failure. Unflushed data is lost.
    #[error("write-back failed: {0}")]
    WriteBack(Arc<StorageError>),
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(Arc::new(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(Arc::new(StorageError::Io(e)))
    }
}
