//! Backend selection from a descriptor and an access intent.

use std::path::PathBuf;

use bytes::Bytes;

use crate::access::{AccessMode, RandomAccess};
use crate::error::{Error, Result};
use crate::memory::{DEFAULT_INITIAL_SIZE, DEFAULT_SEGMENT_SIZE, FlatBuffer, SegmentedBuffer};
use crate::storage::{PagedConfig, PagedFile};

/// What to open.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// A file on disk behind the page cache.
    File {
        path: PathBuf,
        /// Cache budget in bytes; defaults to [`PagedConfig::default`].
        cache_budget: Option<usize>,
        /// Page size override; must be a power of two.
        page_size: Option<usize>,
    },
    /// One contiguous in-memory buffer.
    Flat {
        /// Existing contents, required by the read-only and read-write
        /// existing intents and ignored by the create intents.
        data: Option<Bytes>,
        /// Initial allocation of a fresh buffer.
        initial_size: Option<usize>,
    },
    /// Fixed-size in-memory segments.
    Segmented {
        /// Existing contents; same rules as [`Descriptor::Flat`].
        segments: Option<Vec<Vec<u8>>>,
        /// Bytes pre-allocated for a fresh buffer.
        initial_size: Option<usize>,
        segment_size: Option<usize>,
    },
}

impl Descriptor {
    /// A file descriptor with default cache settings.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Descriptor::File {
            path: path.into(),
            cache_budget: None,
            page_size: None,
        }
    }

    /// A fresh flat buffer with the default initial allocation.
    pub fn flat() -> Self {
        Descriptor::Flat {
            data: None,
            initial_size: None,
        }
    }

    /// A fresh segmented buffer with the default segment size.
    pub fn segmented() -> Self {
        Descriptor::Segmented {
            segments: None,
            initial_size: None,
            segment_size: None,
        }
    }
}

/// An open handle of any kind.
pub enum Backend {
    File(PagedFile),
    Flat(FlatBuffer),
    Segmented(SegmentedBuffer),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::File(_) => "file",
            Backend::Flat(_) => "flat",
            Backend::Segmented(_) => "segmented",
        }
    }
}

/// Opens `descriptor` with the semantics of `mode`.
///
/// For files the mode maps onto open flags. For in-memory kinds the create
/// intents start from an empty buffer, the read-only and read-write existing
/// intents require existing contents, and read-write-or-create uses existing
/// contents when supplied.
///
/// # Errors
///
/// - `Error::Config` for an invalid parameter or missing existing contents
/// - `Error::Storage` if the file cannot be opened
pub async fn open(descriptor: Descriptor, mode: AccessMode) -> Result<Backend> {
    match descriptor {
        Descriptor::File {
            path,
            cache_budget,
            page_size,
        } => {
            let defaults = PagedConfig::default();
            let config = PagedConfig {
                cache_budget: cache_budget.unwrap_or(defaults.cache_budget),
                page_size,
            };
            let file = PagedFile::open(path, mode, config).await?;
            Ok(Backend::File(file))
        }
        Descriptor::Flat { data, initial_size } => {
            let initial_size = initial_size.unwrap_or(DEFAULT_INITIAL_SIZE);
            let buffer = match existing(data, mode)? {
                Some(data) => FlatBuffer::from_bytes(data, mode.is_read_only()),
                None => FlatBuffer::new(initial_size),
            };
            tracing::debug!(kind = "flat", ?mode, size = buffer.size(), "backend opened");
            Ok(Backend::Flat(buffer))
        }
        Descriptor::Segmented {
            segments,
            initial_size,
            segment_size,
        } => {
            let segment_size = segment_size.unwrap_or(DEFAULT_SEGMENT_SIZE);
            let buffer = match existing(segments, mode)? {
                Some(segments) => {
                    SegmentedBuffer::from_segments(segments, segment_size, mode.is_read_only())?
                }
                None => SegmentedBuffer::new(segment_size, initial_size.unwrap_or(0))?,
            };
            tracing::debug!(kind = "segmented", ?mode, size = buffer.size(), "backend opened");
            Ok(Backend::Segmented(buffer))
        }
    }
}

/// Decides whether an in-memory backend starts from `data` or empty.
fn existing<T>(data: Option<T>, mode: AccessMode) -> Result<Option<T>> {
    match mode {
        AccessMode::CreateOverwrite | AccessMode::CreateExclusive => Ok(None),
        AccessMode::ReadWriteOrCreate => Ok(data),
        AccessMode::ReadOnly | AccessMode::ReadWriteExisting => match data {
            Some(data) => Ok(Some(data)),
            None => Err(Error::Config(format!(
                "{mode:?} needs existing contents for an in-memory backend"
            ))),
        },
    }
}

pub async fn create_overwrite(descriptor: Descriptor) -> Result<Backend> {
    open(descriptor, AccessMode::CreateOverwrite).await
}

pub async fn create_exclusive(descriptor: Descriptor) -> Result<Backend> {
    open(descriptor, AccessMode::CreateExclusive).await
}

pub async fn read_existing(descriptor: Descriptor) -> Result<Backend> {
    open(descriptor, AccessMode::ReadOnly).await
}

pub async fn read_write_existing(descriptor: Descriptor) -> Result<Backend> {
    open(descriptor, AccessMode::ReadWriteExisting).await
}

pub async fn read_write_existing_or_create(descriptor: Descriptor) -> Result<Backend> {
    open(descriptor, AccessMode::ReadWriteOrCreate).await
}

impl RandomAccess for Backend {
    async fn write(&self, data: &[u8], pos: Option<u64>) -> Result<()> {
        match self {
            Backend::File(file) => file.write(data, pos).await,
            Backend::Flat(buffer) => buffer.write(data, pos).await,
            Backend::Segmented(buffer) => buffer.write(data, pos).await,
        }
    }

    async fn read_into(&self, dst: &mut [u8], pos: Option<u64>) -> Result<()> {
        match self {
            Backend::File(file) => file.read_into(dst, pos).await,
            Backend::Flat(buffer) => buffer.read_into(dst, pos).await,
            Backend::Segmented(buffer) => buffer.read_into(dst, pos).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Backend::File(file) => file.close().await,
            Backend::Flat(buffer) => buffer.close().await,
            Backend::Segmented(buffer) => buffer.close().await,
        }
    }

    async fn discard(&self) -> Result<()> {
        match self {
            Backend::File(file) => file.discard().await,
            Backend::Flat(buffer) => buffer.discard().await,
            Backend::Segmented(buffer) => buffer.discard().await,
        }
    }

    fn position(&self) -> u64 {
        match self {
            Backend::File(file) => file.position(),
            Backend::Flat(buffer) => buffer.position(),
            Backend::Segmented(buffer) => buffer.position(),
        }
    }

    fn set_position(&self, pos: u64) {
        match self {
            Backend::File(file) => file.set_position(pos),
            Backend::Flat(buffer) => buffer.set_position(pos),
            Backend::Segmented(buffer) => buffer.set_position(pos),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Backend::File(file) => file.size(),
            Backend::Flat(buffer) => buffer.size(),
            Backend::Segmented(buffer) => buffer.size(),
        }
    }
}
