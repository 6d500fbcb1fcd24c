//! Core partitioner trait definitions.

use crate::token::HashToken;

/// A partitioner converts keys into tokens for placement on the hash ring.
///
/// Partitioners must be deterministic across processes and releases: ring
/// layout, and therefore key-to-node assignment, is a pure function of the
/// partitioner and the node id list.
pub trait Partitioner: Send + Sync + 'static {
    /// Converts a key into a token.
    fn token(&self, key: &[u8]) -> HashToken;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}
