//! Storage layer errors.

use thiserror::Error;

/// Errors raised by a physical [`Storage`](super::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage handle was already released by `close`.
    #[error("storage handle is closed")]
    Closed,

    /// Failure injected by a test double.
    ///
    /// Only produced by `MemoryStorage` when a fault has been armed.
    #[error("injected {0} failure")]
    Injected(&'static str),
}
