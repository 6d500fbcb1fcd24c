//! Immutable consistent hash ring with quorum lookup.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{NodeId, SharedHandle};
use crate::partitioner::{Md5Partitioner, Partitioner};
use crate::token::HashToken;
use crate::vnode::VirtualNode;

/// Default number of virtual nodes per physical node.
pub const DEFAULT_VNODES: usize = 160;

/// Default quorum size.
pub const DEFAULT_QUORUM: usize = 3;

/// A consistent hash ring over a fixed node list.
///
/// The ring is immutable once built. Membership changes build a new ring
/// (see [`RingBuilder`]) which callers publish by swapping an `Arc`; see
/// [`KeyBalancer`](crate::key_balancer::KeyBalancer).
///
/// Token order is a pure function of the partitioner and the node id list:
/// each node contributes `vnodes` tokens `token("{id}:{i}")`, and equal tokens
/// are ordered by the node's position in the input list.
pub struct HashRing<C, P = Md5Partitioner> {
    nodes: Vec<SharedHandle<C>>,
    vnodes: Vec<VirtualNode>,
    quorum: usize,
    partitioner: Arc<P>,
}

impl<C, P: Partitioner> HashRing<C, P> {
    /// Number of physical nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of tokens.
    pub fn token_count(&self) -> usize {
        self.vnodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Configured quorum size N.
    pub fn quorum_size(&self) -> usize {
        self.quorum
    }

    pub fn partitioner_name(&self) -> &'static str {
        self.partitioner.name()
    }

    /// Physical nodes in input order.
    pub fn nodes(&self) -> &[SharedHandle<C>] {
        &self.nodes
    }

    /// All `(token, node)` pairs in ring order.
    pub fn tokens(&self) -> Vec<(HashToken, NodeId)> {
        self.vnodes
            .iter()
            .map(|v| (v.token, self.nodes[v.slot()].id().clone()))
            .collect()
    }

    /// Index of the first vnode whose token is `>= token`, wrapping to 0.
    #[inline]
    fn start_index(&self, token: HashToken) -> usize {
        let idx = self.vnodes.partition_point(|v| v.token < token);
        if idx == self.vnodes.len() {
            0
        } else {
            idx
        }
    }

    /// Primary node for `key`.
    pub fn get_node(&self, key: &[u8]) -> Option<&SharedHandle<C>> {
        if self.vnodes.is_empty() {
            return None;
        }
        let idx = self.start_index(self.partitioner.token(key));
        Some(&self.nodes[self.vnodes[idx].slot()])
    }

    /// Up to N distinct nodes for `key`, in ring order starting at the
    /// primary. With fewer than N physical nodes every node is returned once.
    pub fn get_quorum(&self, key: &[u8]) -> Vec<SharedHandle<C>> {
        self.quorum_slots(self.partitioner.token(key))
            .into_iter()
            .map(|slot| Arc::clone(&self.nodes[slot]))
            .collect()
    }

    /// Same as [`get_quorum`](Self::get_quorum) but returning ids.
    pub fn get_quorum_ids(&self, key: &[u8]) -> Vec<NodeId> {
        self.quorum_slots(self.partitioner.token(key))
            .into_iter()
            .map(|slot| self.nodes[slot].id().clone())
            .collect()
    }

    fn quorum_slots(&self, token: HashToken) -> Vec<usize> {
        if self.vnodes.is_empty() {
            return Vec::new();
        }

        let wanted = self.quorum.min(self.nodes.len());
        let mut slots = Vec::with_capacity(wanted);
        let start = self.start_index(token);
        let len = self.vnodes.len();

        for offset in 0..len {
            let slot = self.vnodes[(start + offset) % len].slot();
            if !slots.contains(&slot) {
                slots.push(slot);
                if slots.len() == wanted {
                    break;
                }
            }
        }
        slots
    }

    /// Fraction of the token space for which each node is the primary.
    ///
    /// A vnode owns the range `(previous token, own token]`. Fractions sum to
    /// 1.0 for a non-empty ring.
    pub fn ownership(&self) -> Vec<(NodeId, f64)> {
        let mut owned = vec![0u128; self.nodes.len()];
        let len = self.vnodes.len();
        for (i, vnode) in self.vnodes.iter().enumerate() {
            let prev = self.vnodes[(i + len - 1) % len].token;
            let span = if len == 1 {
                1u128 << 64
            } else {
                prev.distance_to(&vnode.token) as u128
            };
            owned[vnode.slot()] += span;
        }

        let total = (1u128 << 64) as f64;
        self.nodes
            .iter()
            .zip(owned)
            .map(|(node, span)| (node.id().clone(), span as f64 / total))
            .collect()
    }
}

impl<C, P: Partitioner> fmt::Debug for HashRing<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("nodes", &self.nodes.len())
            .field("tokens", &self.vnodes.len())
            .field("quorum", &self.quorum)
            .field("partitioner", &self.partitioner.name())
            .finish()
    }
}

/// Builder for [`HashRing`].
///
/// ```rust
/// use corelib::node::handles_from_ids;
/// use corelib::ring::RingBuilder;
///
/// let ring = RingBuilder::new()
///     .with_vnodes(64)
///     .with_quorum(2)
///     .build(handles_from_ids(["a", "b", "c"]))
///     .unwrap();
/// assert_eq!(ring.get_quorum(b"key").len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuilder<P = Md5Partitioner> {
    vnodes: usize,
    quorum: usize,
    partitioner: Arc<P>,
}

impl RingBuilder<Md5Partitioner> {
    pub fn new() -> Self {
        Self {
            vnodes: DEFAULT_VNODES,
            quorum: DEFAULT_QUORUM,
            partitioner: Arc::new(Md5Partitioner),
        }
    }
}

impl Default for RingBuilder<Md5Partitioner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Partitioner> RingBuilder<P> {
    /// Use a different partitioner.
    pub fn with_partitioner<Q: Partitioner>(self, partitioner: Arc<Q>) -> RingBuilder<Q> {
        RingBuilder {
            vnodes: self.vnodes,
            quorum: self.quorum,
            partitioner,
        }
    }

    /// Virtual nodes per physical node.
    pub fn with_vnodes(mut self, vnodes: usize) -> Self {
        self.vnodes = vnodes;
        self
    }

    /// Quorum size N.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn partitioner(&self) -> &Arc<P> {
        &self.partitioner
    }

    /// Build a ring over `nodes`.
    ///
    /// Fails on zero vnodes, zero quorum, or duplicate node ids. An empty node
    /// list yields an empty ring whose lookups return nothing.
    pub fn build<C>(&self, nodes: Vec<SharedHandle<C>>) -> Result<HashRing<C, P>> {
        if self.vnodes == 0 {
            return Err(Error::Config("virtual nodes per node must be > 0".into()));
        }
        if self.quorum == 0 {
            return Err(Error::Config("quorum size must be > 0".into()));
        }
        if nodes.len() > u32::MAX as usize {
            return Err(Error::InvalidNode("too many nodes for one ring".into()));
        }

        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !seen.insert(node.id()) {
                return Err(Error::DuplicateNode(node.id().clone()));
            }
        }

        let mut vnodes = Vec::with_capacity(nodes.len() * self.vnodes);
        for (slot, node) in nodes.iter().enumerate() {
            for i in 0..self.vnodes {
                vnodes.push(VirtualNode::from_index(
                    &*self.partitioner,
                    node.id(),
                    slot as u32,
                    i,
                ));
            }
        }
        vnodes.sort_unstable();

        debug!(
            nodes = nodes.len(),
            tokens = vnodes.len(),
            quorum = self.quorum,
            partitioner = self.partitioner.name(),
            "hash ring built"
        );

        Ok(HashRing {
            nodes,
            vnodes,
            quorum: self.quorum,
            partitioner: Arc::clone(&self.partitioner),
        })
    }
}
