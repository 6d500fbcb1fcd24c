//! Token abstraction for the hash ring.
//!
//! Tokens are positions on a `u64` ring. They are produced by a
//! [`Partitioner`](crate::partitioner::Partitioner) and are cheap to compare
//! and copy.

pub mod hash;

pub use hash::HashToken;
