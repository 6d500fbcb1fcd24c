//! MD5 partitioner.

use ::md5::{Digest, Md5};

use crate::partitioner::traits::Partitioner;
use crate::token::HashToken;

/// Token = first eight bytes of the MD5 digest, little-endian.
///
/// This is the default partitioner and the one the golden ring tests pin.
#[derive(Clone, Copy, Debug, Default)]
pub struct Md5Partitioner;

impl Partitioner for Md5Partitioner {
    fn token(&self, key: &[u8]) -> HashToken {
        let digest = Md5::digest(key);
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[..8]);
        HashToken(u64::from_le_bytes(low))
    }

    fn name(&self) -> &'static str {
        "Md5Partitioner"
    }
}
