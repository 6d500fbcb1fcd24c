//! Partitioner abstraction for consistent hashing.
//!
//! Partitioners are responsible for converting keys into tokens
//! that can be placed on the hash ring.

pub mod md5;
pub mod sip;
pub mod traits;
pub mod xxh3;

pub use self::md5::Md5Partitioner;
pub use sip::SipPartitioner;
pub use traits::Partitioner;
pub use xxh3::Xxh3Partitioner;
