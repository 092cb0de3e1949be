//! In-memory backend split into fixed-size segments.

use parking_lot::Mutex;

use super::DEFAULT_SEGMENT_SIZE;
use crate::access::RandomAccess;
use crate::error::{Error, Result};
use crate::storage::Spans;

/// An ordered run of segments, each `segment_size` bytes except the last.
///
/// Lets the logical size exceed what one allocation can address. Growth
/// keeps full segments untouched and only resizes the last one or appends
/// new ones. Every segment stays resident.
#[derive(Debug)]
pub struct SegmentedBuffer {
    segment_size: usize,
    inner: Mutex<SegmentedState>,
}

#[derive(Debug)]
struct SegmentedState {
    segments: Vec<Vec<u8>>,
    size: u64,
    pos: u64,
    read_only: bool,
    closed: bool,
}

impl SegmentedBuffer {
    /// An empty writable buffer pre-sized to `initial_size` zero bytes.
    ///
    /// The logical size starts at zero; `initial_size` only reserves
    /// segments.
    pub fn new(segment_size: usize, initial_size: usize) -> Result<Self> {
        check_segment_size(segment_size)?;
        let mut state = SegmentedState::new(Vec::new(), 0, false);
        state.grow(segment_size, initial_size as u64);
        state.size = 0;
        Ok(Self {
            segment_size,
            inner: Mutex::new(state),
        })
    }

    /// A buffer over existing segments.
    ///
    /// Every segment but the last must be exactly `segment_size` bytes and
    /// the last at most that.
    pub fn from_segments(
        segments: Vec<Vec<u8>>,
        segment_size: usize,
        read_only: bool,
    ) -> Result<Self> {
        check_segment_size(segment_size)?;
        if let Some((last, full)) = segments.split_last() {
            if full.iter().any(|s| s.len() != segment_size) || last.len() > segment_size {
                return Err(Error::Config(format!(
                    "segments must be {segment_size} bytes except the last"
                )));
            }
        }
        let size = segments.iter().map(|s| s.len() as u64).sum();
        Ok(Self {
            segment_size,
            inner: Mutex::new(SegmentedState::new(segments, size, read_only)),
        })
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }

    /// The segments holding the logical contents. Typically called after
    /// `close`.
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        let mut state = self.inner.into_inner();
        state.trim(self.segment_size);
        state.segments
    }
}

impl Default for SegmentedBuffer {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            inner: Mutex::new(SegmentedState::new(Vec::new(), 0, false)),
        }
    }
}

fn check_segment_size(segment_size: usize) -> Result<()> {
    if segment_size == 0 {
        return Err(Error::Config("segment size must be non-zero".into()));
    }
    Ok(())
}

impl SegmentedState {
    fn new(segments: Vec<Vec<u8>>, size: u64, read_only: bool) -> Self {
        Self {
            segments,
            size,
            pos: 0,
            read_only,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closing);
        }
        Ok(())
    }

    /// Backed bytes, which may exceed the logical size after a pre-size.
    fn backed(&self) -> u64 {
        self.segments.iter().map(|s| s.len() as u64).sum()
    }

    /// Extends the backing to cover `new_size` bytes.
    fn grow(&mut self, segment_size: usize, new_size: u64) {
        let chunk = segment_size as u64;
        let count = new_size.div_ceil(chunk) as usize;
        let first = self.segments.len().saturating_sub(1);
        for index in first..count {
            let want = (new_size - index as u64 * chunk).min(chunk) as usize;
            match self.segments.get_mut(index) {
                // Resizing copies the existing bytes forward
                Some(segment) if segment.len() < want => segment.resize(want, 0),
                Some(_) => {}
                None => self.segments.push(vec![0; want]),
            }
        }
    }

    /// Drops backing past the logical size.
    fn trim(&mut self, segment_size: usize) {
        let chunk = segment_size as u64;
        let count = self.size.div_ceil(chunk) as usize;
        self.segments.truncate(count);
        if let Some(last) = self.segments.last_mut() {
            let keep = (self.size - (count as u64 - 1) * chunk) as usize;
            last.truncate(keep);
            last.shrink_to_fit();
        }
    }
}

impl RandomAccess for SegmentedBuffer {
    async fn write(&self, data: &[u8], pos: Option<u64>) -> Result<()> {
        let mut state = self.inner.lock();
        state.check_open()?;
        if state.read_only {
            return Err(Error::ReadOnly);
        }
        if data.is_empty() {
            return Ok(());
        }

        let start = pos.unwrap_or(state.pos);
        let end = start.checked_add(data.len() as u64).ok_or(Error::OutOfBounds {
            pos: start,
            len: data.len(),
            size: state.size,
        })?;
        if end > state.backed() {
            state.grow(self.segment_size, end);
        }
        for span in Spans::new(self.segment_size, start, data.len()) {
            state.segments[span.index as usize][span.chunk_range()]
                .copy_from_slice(&data[span.buf_range()]);
        }
        state.pos = end;
        state.size = state.size.max(end);
        Ok(())
    }

    async fn read_into(&self, dst: &mut [u8], pos: Option<u64>) -> Result<()> {
        let mut state = self.inner.lock();
        state.check_open()?;

        let len = dst.len();
        let start = pos.unwrap_or(state.pos);
        let end = start.checked_add(len as u64).ok_or(Error::OutOfBounds {
            pos: start,
            len,
            size: state.size,
        })?;
        if state.read_only && end > state.size {
            return Err(Error::OutOfBounds {
                pos: start,
                len,
                size: state.size,
            });
        }

        let avail = state.size.saturating_sub(start).min(len as u64) as usize;
        for span in Spans::new(self.segment_size, start, avail) {
            dst[span.buf_range()]
                .copy_from_slice(&state.segments[span.index as usize][span.chunk_range()]);
        }
        dst[avail..].fill(0);
        state.pos = end;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(Error::AlreadyClosed);
        }
        state.closed = true;
        state.trim(self.segment_size);
        Ok(())
    }

    async fn discard(&self) -> Result<()> {
        let mut state = self.inner.lock();
        state.closed = true;
        state.size = 0;
        state.segments = Vec::new();
        Ok(())
    }

    fn position(&self) -> u64 {
        self.inner.lock().pos
    }

    fn set_position(&self, pos: u64) {
        self.inner.lock().pos = pos;
    }

    fn size(&self) -> u64 {
        self.inner.lock().size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_across_segments() {
        let buf = SegmentedBuffer::new(8, 0).unwrap();
        let data: Vec<u8> = (1..=20).collect();
        buf.write(&data, Some(3)).await.unwrap();

        assert_eq!(buf.size(), 23);
        assert_eq!(buf.segment_count(), 3);
        assert_eq!(buf.read(20, Some(3)).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_growth_preserves_existing_segments() {
        let buf = SegmentedBuffer::new(4, 0).unwrap();
        buf.write(&[1, 2, 3, 4, 5, 6], Some(0)).await.unwrap();
        buf.write(&[9], Some(13)).await.unwrap();
        buf.close().await.unwrap();

        let segments = buf.into_segments();
        assert_eq!(
            segments,
            vec![vec![1, 2, 3, 4], vec![5, 6, 0, 0], vec![0; 4], vec![0, 9]]
        );
    }

    #[tokio::test]
    async fn test_presized_buffer_starts_empty() {
        let buf = SegmentedBuffer::new(4, 10).unwrap();
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.segment_count(), 3);

        buf.write(&[7], Some(9)).await.unwrap();
        assert_eq!(buf.size(), 10);
        assert_eq!(buf.segment_count(), 3);
    }

    #[tokio::test]
    async fn test_read_past_end_zero_fills_without_growth() {
        let buf = SegmentedBuffer::new(4, 0).unwrap();
        buf.write(&[1, 2, 3], Some(0)).await.unwrap();
        assert_eq!(buf.read(6, Some(1)).await.unwrap(), vec![2, 3, 0, 0, 0, 0]);
        assert_eq!(buf.size(), 3);
    }

    #[tokio::test]
    async fn test_read_only_segments() {
        let segments = vec![vec![1, 2, 3, 4], vec![5, 6]];
        let buf = SegmentedBuffer::from_segments(segments, 4, true).unwrap();
        assert_eq!(buf.size(), 6);
        assert_eq!(buf.read(4, Some(2)).await.unwrap(), vec![3, 4, 5, 6]);
        assert!(matches!(
            buf.read(4, Some(4)).await,
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(buf.write(&[0], None).await, Err(Error::ReadOnly)));
    }

    #[test]
    fn test_invalid_segments_rejected() {
        assert!(matches!(
            SegmentedBuffer::new(0, 0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SegmentedBuffer::from_segments(vec![vec![0; 3], vec![0; 4]], 4, false),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_close_trims_presized_backing() {
        let buf = SegmentedBuffer::new(4, 16).unwrap();
        buf.write(&[1, 2, 3, 4, 5], Some(0)).await.unwrap();
        buf.close().await.unwrap();
        assert_eq!(buf.into_segments(), vec![vec![1, 2, 3, 4], vec![5]]);
    }
}
