//! Wraparound-safe stream offsets
//!
//! Every channel numbers the bytes of its virtual, never-ending output stream.
//! The counter is a fixed-width `u32` that wraps, so offsets are compared the
//! way TCP compares sequence numbers: by the sign of their wrapping
//! difference. Two offsets are ordered correctly as long as they are less
//! than 2^31 bytes apart.
//!
//! ```text
//!     0                                   u32::MAX
//!     |---------------------------------------|
//!                                  a=MAX-3 ──┐
//!       b=2 ◄────────── wraps around ────────┘
//!
//!     a.lt(b) == true, even though a > b numerically
//! ```

use std::fmt;

/// Position in a channel's byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamOffset(u32);

impl StreamOffset {
    /// Offset of the first byte of a fresh stream
    pub const ZERO: StreamOffset = StreamOffset(0);

    /// Create an offset from a raw counter value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw counter value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Advance by `len` bytes, wrapping at the counter width
    pub fn advance(self, len: usize) -> Self {
        Self(self.0.wrapping_add(len as u32))
    }

    /// Signed distance from `other` to `self`
    #[inline]
    fn diff(self, other: StreamOffset) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// `self` comes strictly before `other`
    #[inline]
    pub fn lt(self, other: StreamOffset) -> bool {
        self.diff(other) < 0
    }

    /// `self` comes before or is equal to `other`
    #[inline]
    pub fn leq(self, other: StreamOffset) -> bool {
        self.diff(other) <= 0
    }

    /// `self` comes strictly after `other`
    #[inline]
    pub fn gt(self, other: StreamOffset) -> bool {
        self.diff(other) > 0
    }

    /// `self` comes after or is equal to `other`
    #[inline]
    pub fn geq(self, other: StreamOffset) -> bool {
        self.diff(other) >= 0
    }

    /// Number of bytes from `earlier` up to `self`
    ///
    /// Returns 0 if `earlier` is actually ahead of `self`.
    pub fn distance_from(self, earlier: StreamOffset) -> usize {
        if self.geq(earlier) {
            self.0.wrapping_sub(earlier.0) as usize
        } else {
            0
        }
    }

    /// The earlier of two offsets
    pub fn min(self, other: StreamOffset) -> StreamOffset {
        if self.lt(other) {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
