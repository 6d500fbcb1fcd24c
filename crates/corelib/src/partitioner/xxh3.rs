//! XXH3 partitioner.

use xxhash_rust::xxh3::xxh3_64;

use crate::partitioner::traits::Partitioner;
use crate::token::HashToken;

/// XXH3-64, the fastest of the bundled partitioners.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn token(&self, key: &[u8]) -> HashToken {
        HashToken(xxh3_64(key))
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}
