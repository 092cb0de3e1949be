//! Paged, cached random-access byte storage for very large binary files.
//!
//! Three backends share the [`RandomAccess`] contract:
//!
//! - [`PagedFile`]: a file on disk behind a bounded page cache
//! - [`FlatBuffer`]: one contiguous in-memory buffer
//! - [`SegmentedBuffer`]: in-memory segments for sizes beyond one allocation
//!
//! [`factory::open`] picks one from a [`Descriptor`] and an [`AccessMode`].

pub mod access;
pub mod error;
pub mod factory;
pub mod memory;
pub mod storage;

pub use access::{AccessMode, RandomAccess};
pub use error::{Error, Result};
pub use factory::{Backend, Descriptor};
pub use memory::{FlatBuffer, SegmentedBuffer};
pub use storage::{PagedConfig, PagedFile};
