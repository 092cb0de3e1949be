//! File-backed storage implementation.

use std::path::{Path, PathBuf};
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::Storage;
use crate::access::AccessMode;
use crate::storage::error::StorageError;

/// Block size assumed when the platform does not report one.
const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// File-backed storage implementation.
///
/// Uses `tokio::fs` for async file I/O. The page cache above it guarantees
/// at most one outstanding read and one outstanding write, and the file
/// handle mutex serializes the seek + transfer pair of each.
///
/// # Durability
///
/// Every `write_at` flushes tokio's internal write buffer before returning,
/// so a completed write is visible to any other handle on the same file.
/// No `fsync` ordering is provided.
pub struct FileStorage {
    /// Path to the storage file
    path: PathBuf,
    /// File handle, `None` once closed
    file: Mutex<Option<TokioFile>>,
    /// Block size reported by the file system at open time
    block_size: u64,
}

impl FileStorage {
    /// Opens the file at `path` with the open semantics of `mode`.
    ///
    /// | mode                  | absent   | present           |
    /// |-----------------------|----------|-------------------|
    /// | `CreateOverwrite`     | create   | truncate          |
    /// | `CreateExclusive`     | create   | fail              |
    /// | `ReadOnly`            | fail     | open for reading  |
    /// | `ReadWriteOrCreate`   | create   | preserve          |
    /// | `ReadWriteExisting`   | fail     | preserve          |
    pub async fn open(path: impl Into<PathBuf>, mode: AccessMode) -> Result<Self, StorageError> {
        let path = path.into();

        let mut options = OpenOptions::new();
        options.read(true);
        match mode {
            AccessMode::CreateOverwrite => {
                options.write(true).create(true).truncate(true);
            }
            AccessMode::CreateExclusive => {
                options.write(true).create_new(true);
            }
            AccessMode::ReadOnly => {}
            AccessMode::ReadWriteOrCreate => {
                options.write(true).create(true).truncate(false);
            }
            AccessMode::ReadWriteExisting => {
                options.write(true);
            }
        }

        let file = options.open(&path).await?;
        let metadata = file.metadata().await?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            block_size: block_size_of(&metadata),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn block_size_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    match metadata.blksize() {
        0 => DEFAULT_BLOCK_SIZE,
        n => n,
    }
}

#[cfg(not(unix))]
fn block_size_of(_metadata: &std::fs::Metadata) -> u64 {
    DEFAULT_BLOCK_SIZE
}

impl Storage for FileStorage {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(StorageError::Closed)?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;

        // read() may return early; keep going until EOF or the buffer is full
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(filled)
    }

    async fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(StorageError::Closed)?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(buf).await?;
        file.flush().await?;

        Ok(())
    }

    async fn len(&self) -> Result<u64, StorageError> {
        let guard = self.file.lock().await;
        let file = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(file.metadata().await?.len())
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    async fn close(&self) -> Result<(), StorageError> {
        let file = self.file.lock().await.take();
        if let Some(mut file) = file {
            file.flush().await?;
        }
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }
}
