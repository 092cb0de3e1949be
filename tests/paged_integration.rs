//! Integration tests for the file-backed page cache.

use std::path::Path;

use fastfile::storage::MemoryStorage;
use fastfile::{AccessMode, Error, PagedConfig, PagedFile, RandomAccess};
use futures_util::future::join_all;
use tempfile::tempdir;

/// Config with 256-byte pages and room for `capacity` pages.
fn config(capacity: usize) -> PagedConfig {
    PagedConfig {
        cache_budget: 256 * (capacity - 1),
        page_size: Some(256),
    }
}

async fn create(path: &Path, capacity: usize) -> PagedFile {
    PagedFile::open(path, AccessMode::CreateOverwrite, config(capacity))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_flush_before_evict_scenario() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.bin");
    let file = PagedFile::open(
        &path,
        AccessMode::CreateOverwrite,
        PagedConfig {
            cache_budget: 256,
            page_size: Some(256),
        },
    )
    .await
    .unwrap();
    assert_eq!(file.capacity(), 2);

    file.write(&[0xAA; 10], Some(0)).await.unwrap();
    file.write(&[0xBB; 10], Some(1000)).await.unwrap();

    assert_eq!(file.read(10, Some(0)).await.unwrap(), vec![0xAA; 10]);
    assert_eq!(file.read(10, Some(1000)).await.unwrap(), vec![0xBB; 10]);
    assert_eq!(file.size(), 1010);
    assert!(file.resident_pages() <= 2);

    file.close().await.unwrap();

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), 1010);
    assert_eq!(&on_disk[..10], &[0xAA; 10]);
    assert!(on_disk[10..1000].iter().all(|&b| b == 0));
    assert_eq!(&on_disk[1000..], &[0xBB; 10]);
}

#[tokio::test]
async fn test_eviction_bound_and_durability() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("evict.bin");
    let file = create(&path, 3).await;

    for page in 0..24u64 {
        file.write(&[page as u8 + 1; 256], Some(page * 256)).await.unwrap();
        assert!(file.resident_pages() <= 3);
    }
    for page in 0..24u64 {
        let back = file.read(256, Some(page * 256)).await.unwrap();
        assert_eq!(back, vec![page as u8 + 1; 256], "page {page}");
        assert!(file.resident_pages() <= 3);
    }
    file.close().await.unwrap();

    let reopened = PagedFile::open(&path, AccessMode::ReadOnly, config(3))
        .await
        .unwrap();
    assert_eq!(reopened.size(), 24 * 256);
    for page in (0..24u64).rev() {
        let expected = u32::from_le_bytes([page as u8 + 1; 4]);
        assert_eq!(reopened.read_u32_le(Some(page * 256 + 100)).await.unwrap(), expected);
    }
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_close_drains_unawaited_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drain.bin");
    let file = create(&path, 3).await;

    let writes = (0..24u32).map(|i| file.write_u32_le(i, Some(u64::from(i) * 100)));
    let (results, closed) = tokio::join!(join_all(writes), file.close());

    assert!(results.iter().all(|r| r.is_ok()));
    closed.unwrap();

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), 23 * 100 + 4);
    for i in 0..24usize {
        let at = i * 100;
        let value = u32::from_le_bytes(on_disk[at..at + 4].try_into().unwrap());
        assert_eq!(value, i as u32);
    }
}

#[tokio::test]
async fn test_cursor_writes_land_in_issue_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cursor.bin");
    let file = create(&path, 2).await;

    let records: Vec<Vec<u8>> = (0..24u8).map(|i| vec![i; 37]).collect();
    let writes = records.iter().map(|r| file.write(r, None));
    let results = join_all(writes).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(file.size(), 24 * 37);

    file.set_position(0);
    for i in 0..24u8 {
        assert_eq!(file.read(37, None).await.unwrap(), vec![i; 37]);
    }
    file.close().await.unwrap();
}

#[tokio::test]
async fn test_write_after_close_begins_fails() {
    let dir = tempdir().unwrap();
    let file = create(&dir.path().join("closing.bin"), 2).await;
    file.write(&[1u8; 600], Some(0)).await.unwrap();

    let close = file.close();
    tokio::pin!(close);
    assert!(futures_util::poll!(&mut close).is_pending());

    assert!(matches!(file.write(&[2], None).await, Err(Error::Closing)));
    assert!(matches!(file.read(1, Some(0)).await, Err(Error::Closing)));
    close.await.unwrap();
}

#[tokio::test]
async fn test_reopen_preserves_partial_last_page() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.bin");
    let file = create(&path, 2).await;
    file.write(&[9u8; 300], Some(0)).await.unwrap();
    file.close().await.unwrap();

    let file = PagedFile::open(&path, AccessMode::ReadWriteExisting, config(2))
        .await
        .unwrap();
    assert_eq!(file.size(), 300);
    file.write(&[8u8; 4], Some(298)).await.unwrap();
    assert_eq!(file.size(), 302);
    assert_eq!(file.read(6, Some(296)).await.unwrap(), [9, 9, 8, 8, 8, 8]);
    file.close().await.unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 302);
}

#[tokio::test]
async fn test_writable_read_past_end_is_clamped() {
    let dir = tempdir().unwrap();
    let file = create(&dir.path().join("clamp.bin"), 2).await;
    file.write(&[4u8; 5], Some(0)).await.unwrap();

    assert_eq!(file.read(8, Some(2)).await.unwrap(), [4, 4, 4, 0, 0, 0, 0, 0]);
    assert_eq!(file.read(4, Some(1000)).await.unwrap(), [0; 4]);
    assert_eq!(file.size(), 5);
    file.close().await.unwrap();
}

#[tokio::test]
async fn test_discard_deletes_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scratch.bin");
    let file = create(&path, 2).await;
    file.write(b"scratch", None).await.unwrap();
    file.discard().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_open_modes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("modes.bin");

    let result = PagedFile::open(&path, AccessMode::ReadOnly, config(2)).await;
    assert!(matches!(result, Err(Error::Storage(_))));
    let result = PagedFile::open(&path, AccessMode::ReadWriteExisting, config(2)).await;
    assert!(matches!(result, Err(Error::Storage(_))));

    let file = PagedFile::open(&path, AccessMode::CreateExclusive, config(2))
        .await
        .unwrap();
    file.write(b"first", None).await.unwrap();
    file.close().await.unwrap();

    let result = PagedFile::open(&path, AccessMode::CreateExclusive, config(2)).await;
    assert!(matches!(result, Err(Error::Storage(_))));

    let file = PagedFile::open(&path, AccessMode::ReadWriteOrCreate, config(2))
        .await
        .unwrap();
    assert_eq!(file.read(5, Some(0)).await.unwrap(), b"first");
    file.close().await.unwrap();

    let file = PagedFile::open(&path, AccessMode::CreateOverwrite, config(2))
        .await
        .unwrap();
    assert_eq!(file.size(), 0);
    file.close().await.unwrap();
}

#[tokio::test]
async fn test_write_back_failure_is_sticky() {
    let storage = MemoryStorage::new();
    storage.fail_writes(true);
    let file = PagedFile::with_storage(storage.clone(), false, config(2))
        .await
        .unwrap();

    file.write(&[1u8; 16], Some(0)).await.unwrap();

    let mut rejected = false;
    for _ in 0..100 {
        tokio::task::yield_now().await;
        if let Err(e) = file.write(&[2u8; 16], Some(0)).await {
            assert!(matches!(e, Error::WriteBack(_)));
            rejected = true;
            break;
        }
    }
    assert!(rejected, "write-back failure never surfaced");

    assert!(matches!(file.close().await, Err(Error::WriteBack(_))));
    assert!(storage.contents().is_empty());
}

#[tokio::test]
async fn test_read_failure_rejects_only_its_request() {
    let storage = MemoryStorage::with_data(vec![6u8; 1024]);
    let file = PagedFile::with_storage(storage.clone(), false, config(4))
        .await
        .unwrap();

    storage.fail_reads(1);
    let (first, second) = tokio::join!(file.read(4, Some(0)), file.read(4, Some(512)));
    assert!(matches!(first, Err(Error::Storage(_))));
    assert_eq!(second.unwrap(), vec![6u8; 4]);

    assert_eq!(file.read(4, Some(0)).await.unwrap(), vec![6u8; 4]);
    file.close().await.unwrap();
}
