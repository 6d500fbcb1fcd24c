//! Discovery feed traits and an in-memory feed.

use std::collections::HashMap;
use std::sync::Arc;

use corelib::Node;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DiscoveryError, Result};

/// One instance of a service as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub id: String,
    pub address: String,
    pub tags: Vec<String>,
}

impl DiscoveredNode {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn to_node(&self) -> Node {
        Node::with_address(self.id.as_str(), self.address.clone(), self.tags.clone())
    }
}

/// Pull side of a discovery feed.
pub trait Discovery: Send + Sync {
    fn list_nodes(&self, service: &str) -> Result<Vec<DiscoveredNode>>;
}

/// Push side of a discovery feed: called with the full current list
/// whenever a service's membership changes.
pub trait DiscoveryListener: Send + Sync {
    fn on_nodes_changed(&self, service: &str, nodes: Vec<DiscoveredNode>);
}

/// Builds the transport client for a newly discovered node.
pub trait ClientFactory<C>: Send + Sync {
    fn create(&self, node: &Node) -> Result<C>;
}

impl<C, F> ClientFactory<C> for F
where
    F: Fn(&Node) -> Result<C> + Send + Sync,
{
    fn create(&self, node: &Node) -> Result<C> {
        self(node)
    }
}

/// Discovery feed backed by memory. Used by tools and tests.
#[derive(Default)]
pub struct StaticDiscovery {
    services: RwLock<HashMap<String, Vec<DiscoveredNode>>>,
    listeners: RwLock<Vec<Arc<dyn DiscoveryListener>>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn DiscoveryListener>) {
        self.listeners.write().push(listener);
    }

    /// Replace the node list of `service` and notify every listener.
    pub fn publish(&self, service: &str, nodes: Vec<DiscoveredNode>) {
        self.services
            .write()
            .insert(service.to_string(), nodes.clone());
        let listeners = self.listeners.read().clone();
        debug!(
            service,
            nodes = nodes.len(),
            listeners = listeners.len(),
            "publishing nodes"
        );
        for listener in listeners {
            listener.on_nodes_changed(service, nodes.clone());
        }
    }
}

impl Discovery for StaticDiscovery {
    fn list_nodes(&self, service: &str) -> Result<Vec<DiscoveredNode>> {
        self.services
            .read()
            .get(service)
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownService(service.to_string()))
    }
}
