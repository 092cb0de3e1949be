//! Page cache between logical byte ranges and physical storage.
//!
//! # Components
//!
//! - [`PagedFile`]: the handle; splits operations into page spans
//! - [`PagedConfig`]: cache budget and page size override
//! - page table, LRU replacer and scheduler: internal bookkeeping
//!
//! # Locking
//!
//! One `parking_lot::Mutex` guards all bookkeeping for a handle. It is
//! never held across an `.await`, and page claims are never dropped while
//! it is held (dropping a claim takes the lock).
//!
//! # Example
//!
//! ```no_run
//! use fastfile::{AccessMode, PagedConfig, PagedFile, RandomAccess};
//!
//! # async fn example() -> fastfile::Result<()> {
//! let file = PagedFile::open("data.bin", AccessMode::CreateOverwrite, PagedConfig::default()).await?;
//! file.write(b"header", Some(0)).await?;
//! let bytes = file.read(6, Some(0)).await?;
//! assert_eq!(bytes, b"header");
//! file.close().await?;
//! # Ok(())
//! # }
//! ```

mod frame;
mod guard;
mod paged;
mod replacer;
mod scheduler;
mod table;

pub use paged::{DEFAULT_CACHE_BUDGET, PagedConfig, PagedFile};
