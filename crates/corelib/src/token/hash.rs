//! 64-bit hash token.

use std::fmt;

/// Position on the `u64` token ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct HashToken(pub u64);

impl HashToken {
    pub const MIN: HashToken = HashToken(0);
    pub const MAX: HashToken = HashToken(u64::MAX);

    /// Clockwise distance from `self` to `other` on the ring.
    ///
    /// The distance from a token to itself is zero, not a full turn.
    pub fn distance_to(&self, other: &Self) -> u64 {
        other.0.wrapping_sub(self.0)
    }
}

impl fmt::Display for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
