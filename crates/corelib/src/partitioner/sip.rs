//! SipHash partitioner.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::partitioner::traits::Partitioner;
use crate::token::HashToken;

/// SipHash-1-3 with zero keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipPartitioner;

impl Partitioner for SipPartitioner {
    fn token(&self, key: &[u8]) -> HashToken {
        let mut hasher = SipHasher13::new();
        hasher.write(key);
        HashToken(hasher.finish())
    }

    fn name(&self) -> &'static str {
        "SipPartitioner"
    }
}
