//! File-backed storage: physical I/O and the page cache above it.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | PagedFile         |  <- buffer
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | Storage Trait     |  <- io
//! +-------------------+
//!       /      \
//!      v        v
//! +--------------+ +-------------+
//! | MemoryStorage| | FileStorage |
//! +--------------+ +-------------+
//! ```

pub mod buffer;
pub mod error;
pub mod io;
pub mod page;

pub use buffer::{PagedConfig, PagedFile};
pub use error::StorageError;
pub use io::{FileStorage, MemoryStorage, Storage};
pub use page::{PageBuf, PageGeometry, PageId, Span, Spans};
