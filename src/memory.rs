//! In-memory backends.
//!
//! Both keep every byte resident and perform no physical I/O; they differ
//! in how the bytes are laid out:
//!
//! - [`FlatBuffer`]: one contiguous, geometrically growing allocation
//! - [`SegmentedBuffer`]: fixed-size segments, for sizes one allocation
//!   cannot address

mod flat;
mod segmented;

pub use flat::FlatBuffer;
pub use segmented::SegmentedBuffer;

/// Default segment size (4 MiB).
pub const DEFAULT_SEGMENT_SIZE: usize = 1 << 22;

/// Default initial allocation of a flat buffer (1 MiB).
pub const DEFAULT_INITIAL_SIZE: usize = 1 << 20;

/// Minimum growth step of a flat buffer.
const GROWTH_STEP: usize = 1 << 20;
