//! Behaviour shared by every backend behind the factory.

use fastfile::factory::{self, Backend, Descriptor};
use fastfile::{AccessMode, RandomAccess};
use tempfile::TempDir;

/// Opens one fresh writable handle of each kind, all with 256-byte chunks.
async fn fresh_backends(dir: &TempDir) -> Vec<Backend> {
    let descriptors = [
        Descriptor::File {
            path: dir.path().join("round_trip.bin"),
            cache_budget: Some(256 * 2),
            page_size: Some(256),
        },
        Descriptor::Flat {
            data: None,
            initial_size: Some(64),
        },
        Descriptor::Segmented {
            segments: None,
            initial_size: None,
            segment_size: Some(256),
        },
    ];

    let mut backends = Vec::new();
    for descriptor in descriptors {
        backends.push(
            factory::open(descriptor, AccessMode::CreateOverwrite)
                .await
                .unwrap(),
        );
    }
    backends
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[tokio::test]
async fn test_round_trip_aligned_and_unaligned() {
    let dir = tempfile::tempdir().unwrap();

    // (position, length): within one chunk, across two, across three or more
    let cases = [
        (0u64, 10usize),
        (0, 256),
        (17, 100),
        (250, 12),
        (256, 512),
        (300, 600),
        (1023, 1030),
    ];

    for backend in fresh_backends(&dir).await {
        for (i, &(pos, len)) in cases.iter().enumerate() {
            let data = pattern(len, i as u8);
            backend.write(&data, Some(pos)).await.unwrap();
            let back = backend.read(len, Some(pos)).await.unwrap();
            assert_eq!(back, data, "{} backend at {pos}+{len}", backend.kind());
        }
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_growth_exactness() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        assert_eq!(backend.size(), 0);
        backend.write(&[1u8; 40], Some(700)).await.unwrap();
        assert_eq!(backend.size(), 740, "{} backend", backend.kind());

        backend.write(&[2u8; 100], Some(0)).await.unwrap();
        assert_eq!(backend.size(), 740, "{} backend", backend.kind());

        backend.write(&[3u8; 900], Some(0)).await.unwrap();
        assert_eq!(backend.size(), 900, "{} backend", backend.kind());
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_cursor_advances_in_issue_order() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.write(b"abc", None).await.unwrap();
        backend.write(b"defg", None).await.unwrap();
        assert_eq!(backend.position(), 7);

        backend.set_position(2);
        assert_eq!(backend.read(3, None).await.unwrap(), b"cde");
        assert_eq!(backend.position(), 5);
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_scalar_codecs() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.write_u32_le(0xDEADBEEF, Some(0)).await.unwrap();
        assert_eq!(backend.read_u32_le(Some(0)).await.unwrap(), 0xDEADBEEF);
        assert_eq!(backend.read(4, Some(0)).await.unwrap(), [0xEF, 0xBE, 0xAD, 0xDE]);

        backend.write_u32_be(0xDEADBEEF, Some(4)).await.unwrap();
        assert_eq!(backend.read_u32_le(Some(4)).await.unwrap(), 0xEFBEADDE);
        assert_eq!(backend.read_u32_be(Some(4)).await.unwrap(), 0xDEADBEEF);

        backend.write_u64_le(0x1_0000_0001, Some(254)).await.unwrap();
        assert_eq!(backend.read_u64_le(Some(254)).await.unwrap(), 0x1_0000_0001);
        assert_eq!(
            backend.read(8, Some(254)).await.unwrap(),
            0x1_0000_0001u64.to_le_bytes()
        );

        backend.write_u64_le(u64::MAX - 1, None).await.unwrap();
        assert_eq!(backend.read_u64_le(Some(262)).await.unwrap(), u64::MAX - 1);
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_cursor_default_scalars_are_sequential() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        for value in 0..10u32 {
            backend.write_u32_le(value, None).await.unwrap();
        }
        backend.set_position(0);
        for value in 0..10u32 {
            assert_eq!(backend.read_u32_le(None).await.unwrap(), value);
        }
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_double_close_and_use_after_close() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.write(b"x", None).await.unwrap();
        backend.close().await.unwrap();
        assert!(matches!(
            backend.close().await,
            Err(fastfile::Error::AlreadyClosed)
        ));
        assert!(matches!(
            backend.write(b"y", None).await,
            Err(fastfile::Error::Closing)
        ));
    }
}

#[tokio::test]
async fn test_read_only_rejects_over_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.bin");
    std::fs::write(&path, [5u8; 10]).unwrap();

    let descriptors = [
        Descriptor::file(&path),
        Descriptor::Flat {
            data: Some(bytes::Bytes::from(vec![5u8; 10])),
            initial_size: None,
        },
        Descriptor::Segmented {
            segments: Some(vec![vec![5u8; 8], vec![5u8; 2]]),
            initial_size: None,
            segment_size: Some(8),
        },
    ];

    for descriptor in descriptors {
        let backend = factory::read_existing(descriptor).await.unwrap();
        assert_eq!(backend.read(10, Some(0)).await.unwrap(), vec![5u8; 10]);
        assert!(matches!(
            backend.read(1, Some(10)).await,
            Err(fastfile::Error::OutOfBounds { pos: 10, len: 1, size: 10 })
        ));
        assert!(matches!(
            backend.write(&[0], Some(0)).await,
            Err(fastfile::Error::ReadOnly)
        ));
        backend.close().await.unwrap();
    }
}

/// Filler, then three NUL-terminated strings.
fn strings_layout(filler: usize) -> Vec<u8> {
    let mut data = vec![1u8; filler];
    data.extend_from_slice(b"0123456789\0Hi_there\0/!!--::**\0");
    data
}

#[tokio::test]
async fn test_read_string_across_chunk_boundary() {
    let dir = tempfile::tempdir().unwrap();

    // Ends just before the boundary, then straddles it
    for filler in [256 - 11, 256 - 5] {
        for backend in fresh_backends(&dir).await {
            backend.write(&vec![1u8; filler], None).await.unwrap();
            backend.write(b"0123456789\0", None).await.unwrap();
            backend.write(b"Hi_there\0", None).await.unwrap();
            backend.write(b"/!!--::**\0", None).await.unwrap();

            let kind = backend.kind();
            assert_eq!(
                backend.read_string(Some(filler as u64)).await.unwrap(),
                "0123456789",
                "{kind} backend"
            );
            assert_eq!(backend.position(), filler as u64 + 11);
            assert_eq!(backend.read_string(None).await.unwrap(), "Hi_there");
            assert_eq!(backend.read_string(None).await.unwrap(), "/!!--::**");
            assert_eq!(backend.position(), backend.size());
            backend.close().await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_read_string_longer_than_one_scan() {
    let dir = tempfile::tempdir().unwrap();
    let text = "fastfile".repeat(90);

    for backend in fresh_backends(&dir).await {
        backend.write(text.as_bytes(), Some(10)).await.unwrap();
        backend.write(&[0], None).await.unwrap();
        assert_eq!(backend.read_string(Some(10)).await.unwrap(), text);
        assert_eq!(backend.position(), 10 + text.len() as u64 + 1);
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_writable_read_string_stops_at_end() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.write(b"tail", Some(0)).await.unwrap();
        assert_eq!(backend.read_string(Some(0)).await.unwrap(), "tail");
        assert_eq!(backend.position(), 5);
        assert_eq!(backend.read_string(Some(100)).await.unwrap(), "");
        assert_eq!(backend.size(), 4);
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_read_string_rejects_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.write(&[b'o', 0xFF, b'k', 0], Some(0)).await.unwrap();
        assert!(matches!(
            backend.read_string(Some(0)).await,
            Err(fastfile::Error::InvalidString { pos: 0, .. })
        ));
        assert_eq!(backend.position(), 4);
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_read_only_read_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strings.bin");
    let data = strings_layout(256 - 11);
    std::fs::write(&path, &data).unwrap();

    let descriptors = [
        Descriptor::File {
            path: path.clone(),
            cache_budget: Some(256),
            page_size: Some(256),
        },
        Descriptor::Flat {
            data: Some(bytes::Bytes::from(data.clone())),
            initial_size: None,
        },
        Descriptor::Segmented {
            segments: Some(data.chunks(256).map(<[u8]>::to_vec).collect()),
            initial_size: None,
            segment_size: Some(256),
        },
    ];

    for descriptor in descriptors {
        let backend = factory::read_existing(descriptor).await.unwrap();
        let kind = backend.kind();
        assert_eq!(
            backend.read_string(Some(245)).await.unwrap(),
            "0123456789",
            "{kind} backend"
        );
        assert_eq!(backend.read_string(None).await.unwrap(), "Hi_there");
        assert_eq!(backend.read_string(None).await.unwrap(), "/!!--::**");

        let size = backend.size();
        assert!(matches!(
            backend.read_string(Some(size + 10)).await,
            Err(fastfile::Error::OutOfBounds { len: 1, .. })
        ));
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_read_only_unterminated_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, b"ab\0cd").unwrap();

    let descriptors = [
        Descriptor::file(&path),
        Descriptor::Flat {
            data: Some(bytes::Bytes::from_static(b"ab\0cd")),
            initial_size: None,
        },
        Descriptor::Segmented {
            segments: Some(vec![b"ab\0".to_vec(), b"cd".to_vec()]),
            initial_size: None,
            segment_size: Some(3),
        },
        Descriptor::Segmented {
            segments: Some(vec![vec![0]]),
            initial_size: None,
            segment_size: None,
        },
    ];

    for descriptor in descriptors {
        let backend = factory::read_existing(descriptor).await.unwrap();
        if backend.size() == 1 {
            assert!(matches!(
                backend.read_string(Some(10)).await,
                Err(fastfile::Error::OutOfBounds { pos: 10, len: 1, size: 1 })
            ));
            backend.close().await.unwrap();
            continue;
        }

        assert_eq!(backend.read_string(None).await.unwrap(), "ab");
        assert!(matches!(
            backend.read_string(None).await,
            Err(fastfile::Error::UnterminatedString { pos: 3 })
        ));
        assert!(matches!(
            backend.read_string(Some(10)).await,
            Err(fastfile::Error::OutOfBounds { pos: 10, len: 1, size: 5 })
        ));
        backend.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_empty_operations_after_close() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        backend.close().await.unwrap();
        let kind = backend.kind();
        assert!(
            matches!(backend.write(&[], None).await, Err(fastfile::Error::Closing)),
            "{kind} backend"
        );
        assert!(
            matches!(
                backend.read_into(&mut [], None).await,
                Err(fastfile::Error::Closing)
            ),
            "{kind} backend"
        );
    }
}

#[tokio::test]
async fn test_range_past_u64_max_is_out_of_bounds() {
    let dir = tempfile::tempdir().unwrap();

    for backend in fresh_backends(&dir).await {
        let kind = backend.kind();
        assert!(
            matches!(
                backend.write(&[1u8; 4], Some(u64::MAX - 1)).await,
                Err(fastfile::Error::OutOfBounds { pos, len: 4, .. }) if pos == u64::MAX - 1
            ),
            "{kind} backend"
        );
        assert!(
            matches!(
                backend.read(4, Some(u64::MAX - 1)).await,
                Err(fastfile::Error::OutOfBounds { len: 4, .. })
            ),
            "{kind} backend"
        );
        assert_eq!(backend.size(), 0);
        backend.close().await.unwrap();
    }
}
