//! Node abstractions for routing.
//!
//! A [`Node`] is what discovery tells us about a remote service instance. A
//! [`NodeHandle`] pairs it with the client object used to talk to it and a
//! routing weight. Balancers and rings hold handles behind `Arc` and only ever
//! select among them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a node as published by discovery (typically `host:port`).
///
/// The ring derives its token positions from this string, so it must be
/// stable across restarts.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// A remote service instance.
///
/// Keep this struct small and cheap to clone; connections and health live
/// elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Address the transport connects to.
    pub address: String,
    /// Free-form discovery tags (datacenter, version, ...).
    pub tags: Vec<String>,
}

impl Node {
    /// Construct a node whose address equals its id.
    pub fn new(id: impl Into<NodeId>) -> Self {
        let id = id.into();
        Self {
            address: id.as_str().to_owned(),
            id,
            tags: Vec::new(),
        }
    }

    pub fn with_address(
        id: impl Into<NodeId>,
        address: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            tags,
        }
    }
}

/// A node plus its client and routing weight.
///
/// The weight is stored as `f64` bits in an atomic so the owner can adjust it
/// while balancers read it during their next rebalance.
pub struct NodeHandle<C> {
    node: Node,
    client: C,
    weight: AtomicU64,
}

impl<C> NodeHandle<C> {
    pub fn new(node: Node, client: C) -> Self {
        Self::with_weight(node, client, 1.0)
    }

    pub fn with_weight(node: Node, client: C, weight: f64) -> Self {
        Self {
            node,
            client,
            weight: AtomicU64::new(weight.to_bits()),
        }
    }

    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    #[inline]
    pub fn node(&self) -> &Node {
        &self.node
    }

    #[inline]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Raw weight. May be `NaN` or infinite; balancers normalize it.
    pub fn weight(&self) -> f64 {
        f64::from_bits(self.weight.load(Ordering::Relaxed))
    }

    pub fn set_weight(&self, weight: f64) {
        self.weight.store(weight.to_bits(), Ordering::Relaxed);
    }
}

impl<C> fmt::Debug for NodeHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.node.id)
            .field("address", &self.node.address)
            .field("weight", &self.weight())
            .finish()
    }
}

/// Shared handle as stored by balancers and rings.
pub type SharedHandle<C> = Arc<NodeHandle<C>>;

/// Convenience for tests and tools: handles with a unit client.
pub fn handles_from_ids<I, S>(ids: I) -> Vec<SharedHandle<()>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|id| Arc::new(NodeHandle::new(Node::new(id.as_ref()), ())))
        .collect()
}
