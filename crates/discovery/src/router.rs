//! Per-service routing state fed by discovery.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use corelib::balancer::Weigher;
use corelib::health::Transition;
use corelib::partitioner::Md5Partitioner;
use corelib::{
    Balancer, HealthRegistry, KeyBalancer, NodeHandle, NodeId, Partitioner, RoutingConfig,
    SharedHandle,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::feed::{ClientFactory, DiscoveredNode, Discovery, DiscoveryListener};

/// What one discovery update changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterUpdate {
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
    /// Nodes dropped because their client could not be built or their id
    /// was listed twice.
    pub skipped: usize,
}

impl RouterUpdate {
    pub fn is_change(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Routing state of one logical service.
///
/// Holds the dual-ring [`KeyBalancer`] for keyed calls and a weighted
/// [`Balancer`] for unkeyed ones. Both are rebuilt on every discovery update
/// and share one health registry; excluded nodes weigh zero in the
/// balancer.
pub struct ServiceRouter<C, P = Md5Partitioner> {
    service: String,
    config: RoutingConfig,
    factory: Arc<dyn ClientFactory<C>>,
    keys: Arc<KeyBalancer<C, P>>,
    balancer: ArcSwap<Balancer<C>>,
    writer: Mutex<()>,
}

impl<C: Send + Sync + 'static> ServiceRouter<C, Md5Partitioner> {
    pub fn new(
        service: impl Into<String>,
        config: RoutingConfig,
        factory: Arc<dyn ClientFactory<C>>,
    ) -> Result<Self> {
        Self::with_partitioner(service, config, factory, Arc::new(Md5Partitioner))
    }
}

impl<C: Send + Sync + 'static, P: Partitioner> ServiceRouter<C, P> {
    pub fn with_partitioner(
        service: impl Into<String>,
        config: RoutingConfig,
        factory: Arc<dyn ClientFactory<C>>,
        partitioner: Arc<P>,
    ) -> Result<Self> {
        let keys = Arc::new(KeyBalancer::with_partitioner(
            Vec::new(),
            &config,
            partitioner,
        )?);
        let balancer = Balancer::with_weigher(Vec::new(), health_weigher(keys.health()));
        Ok(Self {
            service: service.into(),
            config,
            factory,
            keys,
            balancer: ArcSwap::from_pointee(balancer),
            writer: Mutex::new(()),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn key_balancer(&self) -> &Arc<KeyBalancer<C, P>> {
        &self.keys
    }

    pub fn balancer(&self) -> Arc<Balancer<C>> {
        self.balancer.load_full()
    }

    /// Weighted-random pick among working nodes.
    pub fn get(&self) -> Option<SharedHandle<C>> {
        self.balancer.load().get().cloned()
    }

    /// Working-ring quorum for `key`.
    pub fn get_quorum(&self, key: &[u8]) -> Vec<SharedHandle<C>> {
        self.keys.get_quorum(key)
    }

    /// Pull the current node list from `discovery` and apply it.
    pub fn bootstrap(&self, discovery: &dyn Discovery) -> Result<RouterUpdate> {
        let nodes = discovery.list_nodes(&self.service)?;
        self.apply(nodes)
    }

    /// Replace the node set with `nodes`.
    ///
    /// Handles whose id and address are unchanged are reused, so their
    /// clients and weights survive. Nodes are ordered by id before the rings
    /// and balancer are rebuilt.
    pub fn apply(&self, nodes: Vec<DiscoveredNode>) -> Result<RouterUpdate> {
        let _writer = self.writer.lock();

        let current: HashMap<NodeId, SharedHandle<C>> = self
            .keys
            .nodes()
            .iter()
            .map(|h| (h.id().clone(), Arc::clone(h)))
            .collect();

        let mut update = RouterUpdate::default();
        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(nodes.len());
        for discovered in nodes {
            let id = NodeId::new(&discovered.id);
            if !seen.insert(id.clone()) {
                warn!(service = %self.service, node = %id, "node listed twice, keeping first");
                update.skipped += 1;
                continue;
            }
            match current.get(&id) {
                Some(handle) if handle.node().address == discovered.address => {
                    update.kept += 1;
                    handles.push(Arc::clone(handle));
                }
                _ => {
                    let node = discovered.to_node();
                    match self.factory.create(&node) {
                        Ok(client) => {
                            update.added += 1;
                            handles.push(Arc::new(NodeHandle::new(node, client)));
                        }
                        Err(err) => {
                            warn!(
                                service = %self.service,
                                node = %id,
                                error = %err,
                                "client creation failed, skipping node"
                            );
                            update.skipped += 1;
                        }
                    }
                }
            }
        }
        update.removed = current.len() - update.kept;
        handles.sort_by(|a, b| a.id().cmp(b.id()));

        self.keys.update_nodes(handles.clone())?;
        self.balancer.store(Arc::new(Balancer::with_weigher(
            handles,
            health_weigher(self.keys.health()),
        )));

        if update.is_change() {
            info!(
                service = %self.service,
                added = update.added,
                removed = update.removed,
                kept = update.kept,
                "service nodes changed"
            );
        } else {
            debug!(service = %self.service, kept = update.kept, "service nodes unchanged");
        }
        Ok(update)
    }

    /// One circuit-breaker pass: evaluate health, rebuild the working ring on
    /// transitions, and re-balance the weighted balancer.
    pub fn run_maintenance(&self, now: Instant) -> Result<Vec<(NodeId, Transition)>> {
        let transitions = self.keys.evaluate_health(now)?;
        self.balancer.load().re_balance();
        Ok(transitions)
    }
}

impl<C: Send + Sync + 'static, P: Partitioner> DiscoveryListener for ServiceRouter<C, P> {
    fn on_nodes_changed(&self, service: &str, nodes: Vec<DiscoveredNode>) {
        if service != self.service {
            return;
        }
        if let Err(err) = self.apply(nodes) {
            warn!(service, error = %err, "failed to apply discovery update");
        }
    }
}

impl<C, P: Partitioner> std::fmt::Debug for ServiceRouter<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("service", &self.service)
            .field("keys", &self.keys)
            .finish()
    }
}

/// Node weight while in the working ring, zero while excluded.
fn health_weigher<C: 'static>(health: &Arc<HealthRegistry>) -> Weigher<C> {
    let health = Arc::clone(health);
    Arc::new(move |handle: &NodeHandle<C>| {
        if health.is_in_ring(handle.id()) {
            handle.weight()
        } else {
            0.0
        }
    })
}
