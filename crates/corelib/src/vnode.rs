//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Instead of each physical node having a single token on the ring, each node
//! owns several tokens (virtual nodes). This gives:
//!
//! 1. **Better Load Distribution**: more tokens smooth out the key spread
//! 2. **Gradual Rebalancing**: when a node leaves, only its own ranges move,
//!    and they are spread over many successors instead of one
//!
//! # Performance Characteristics
//!
//! - **Memory**: 16 bytes per vnode
//! - **Lookup**: O(log n) where n = total vnodes

use crate::node::NodeId;
use crate::partitioner::Partitioner;
use crate::token::HashToken;

/// A virtual node on the hash ring.
///
/// The owning physical node is stored as its slot in the ring's node list
/// rather than by id, so quorum walks compare integers.
///
/// # Invariants
///
/// - Ordering is by token first, then slot. Two vnodes with the same token
///   therefore still sort deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualNode {
    /// Token position on the ring.
    pub token: HashToken,

    /// Index of the owning node in the ring's node list.
    pub slot: u32,
}

impl VirtualNode {
    #[inline]
    pub fn new(token: HashToken, slot: u32) -> Self {
        Self { token, slot }
    }

    /// Create the `vnode_index`-th virtual node of `node_id`.
    ///
    /// The token is the partitioner's hash of `"{node_id}:{vnode_index}"`.
    /// This string format is part of the ring's stable layout.
    pub fn from_index<P: Partitioner + ?Sized>(
        partitioner: &P,
        node_id: &NodeId,
        slot: u32,
        vnode_index: usize,
    ) -> Self {
        let vnode_key = format!("{}:{}", node_id, vnode_index);
        Self::new(partitioner.token(vnode_key.as_bytes()), slot)
    }

    #[inline]
    pub fn token(&self) -> HashToken {
        self.token
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

impl std::fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VNode(token={}, slot={})", self.token, self.slot)
    }
}
