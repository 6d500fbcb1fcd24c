//! Dual-ring key balancer.
//!
//! Keeps two consistent hash rings over the same node set:
//!
//! - the **working** ring holds only nodes whose health says they are in
//!   ring, and serves normal quorum lookups;
//! - the **recovery** ring holds every known node, and is used to find
//!   excluded nodes that are due a probe for a given key.
//!
//! Both rings, and the node list itself, are published through `ArcSwap`.
//! Readers load one snapshot per lookup and never block; writers (discovery
//! updates and health-driven rebalances) are serialised by a mutex that
//! readers never touch.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::RoutingConfig;
use crate::error::Result;
use crate::health::{HealthRegistry, Transition};
use crate::node::{NodeId, SharedHandle};
use crate::partitioner::{Md5Partitioner, Partitioner};
use crate::ring::{HashRing, RingBuilder};

pub struct KeyBalancer<C, P = Md5Partitioner> {
    builder: RingBuilder<P>,
    health: Arc<HealthRegistry>,
    nodes: ArcSwap<Vec<SharedHandle<C>>>,
    working: ArcSwap<HashRing<C, P>>,
    recovery: ArcSwap<HashRing<C, P>>,
    writer: Mutex<()>,
}

impl<C> KeyBalancer<C, Md5Partitioner> {
    /// Build a balancer using the default MD5 partitioner.
    pub fn new(nodes: Vec<SharedHandle<C>>, config: &RoutingConfig) -> Result<Self> {
        Self::with_partitioner(nodes, config, Arc::new(Md5Partitioner))
    }
}

impl<C, P: Partitioner> KeyBalancer<C, P> {
    pub fn with_partitioner(
        nodes: Vec<SharedHandle<C>>,
        config: &RoutingConfig,
        partitioner: Arc<P>,
    ) -> Result<Self> {
        config.validate()?;
        let builder = RingBuilder::new()
            .with_partitioner(partitioner)
            .with_vnodes(config.virtual_nodes_per_physical_node)
            .with_quorum(config.quorum_size);
        let health = Arc::new(HealthRegistry::new(config.health_policy()));

        for node in &nodes {
            health.track(node.id());
        }
        let recovery = builder.build(nodes.clone())?;
        let working = builder.build(nodes.clone())?;

        Ok(Self {
            builder,
            health,
            nodes: ArcSwap::from_pointee(nodes),
            working: ArcSwap::from_pointee(working),
            recovery: ArcSwap::from_pointee(recovery),
            writer: Mutex::new(()),
        })
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Current node list snapshot.
    pub fn nodes(&self) -> Arc<Vec<SharedHandle<C>>> {
        self.nodes.load_full()
    }

    pub fn working_ring(&self) -> Arc<HashRing<C, P>> {
        self.working.load_full()
    }

    pub fn recovery_ring(&self) -> Arc<HashRing<C, P>> {
        self.recovery.load_full()
    }

    /// Primary working node for `key`.
    pub fn get_node(&self, key: &[u8]) -> Option<SharedHandle<C>> {
        self.working.load().get_node(key).cloned()
    }

    /// Working-ring quorum for `key`. Empty when no node is in ring.
    pub fn get_quorum(&self, key: &[u8]) -> Vec<SharedHandle<C>> {
        self.working.load().get_quorum(key)
    }

    /// Recovery-ring quorum for `key`, or empty if no member of it is due a
    /// probe.
    ///
    /// A non-empty result means at least one excluded member has just been
    /// granted a probe slot; the caller is expected to send it a real request.
    pub fn get_quorum_by_key_recovery(&self, key: &[u8]) -> Vec<SharedHandle<C>> {
        self.get_quorum_by_key_recovery_at(key, Instant::now())
    }

    pub fn get_quorum_by_key_recovery_at(&self, key: &[u8], now: Instant) -> Vec<SharedHandle<C>> {
        let (quorum, probes) = self.recovery_probe(key, now);
        if probes.is_empty() {
            Vec::new()
        } else {
            quorum
        }
    }

    /// Excluded members of `key`'s recovery quorum that were just granted a
    /// probe slot.
    pub fn probe_candidates(&self, key: &[u8]) -> Vec<SharedHandle<C>> {
        self.probe_candidates_at(key, Instant::now())
    }

    pub fn probe_candidates_at(&self, key: &[u8], now: Instant) -> Vec<SharedHandle<C>> {
        self.recovery_probe(key, now).1
    }

    fn recovery_probe(
        &self,
        key: &[u8],
        now: Instant,
    ) -> (Vec<SharedHandle<C>>, Vec<SharedHandle<C>>) {
        let quorum = self.recovery.load().get_quorum(key);
        let mut probes = Vec::new();
        for member in &quorum {
            let Some(health) = self.health.get(member.id()) else {
                continue;
            };
            // every excluded member must get its own chance at a slot
            if !health.is_in_ring() && health.should_send_test_request_at(now) {
                probes.push(Arc::clone(member));
            }
        }
        (quorum, probes)
    }

    /// Replace the node set and rebuild both rings.
    ///
    /// Health records are created for new nodes and dropped for withdrawn
    /// ones. On error (duplicate ids) nothing is published.
    pub fn update_nodes(&self, nodes: Vec<SharedHandle<C>>) -> Result<()> {
        let _writer = self.writer.lock();

        let recovery = self.builder.build(nodes.clone())?;
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id().clone()).collect();
        for id in &ids {
            self.health.track(id);
        }
        self.health.retain(&ids);
        let working = self.builder.build(self.in_ring(&nodes))?;

        debug!(
            nodes = nodes.len(),
            working = working.node_count(),
            "key balancer node set updated"
        );
        self.nodes.store(Arc::new(nodes));
        self.recovery.store(Arc::new(recovery));
        self.working.store(Arc::new(working));
        Ok(())
    }

    /// Rebuild the working ring from current health.
    pub fn rebalance(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let nodes = self.nodes.load_full();
        let working = self.builder.build(self.in_ring(&nodes))?;
        debug!(
            nodes = nodes.len(),
            working = working.node_count(),
            "working ring rebuilt"
        );
        self.working.store(Arc::new(working));
        Ok(())
    }

    /// Run one circuit-breaker evaluation and rebuild the working ring if any
    /// node changed state.
    pub fn evaluate_health(&self, now: Instant) -> Result<Vec<(NodeId, Transition)>> {
        let transitions = self.health.evaluate_all(now);
        if !transitions.is_empty() {
            self.rebalance()?;
        }
        Ok(transitions)
    }

    fn in_ring(&self, nodes: &[SharedHandle<C>]) -> Vec<SharedHandle<C>> {
        nodes
            .iter()
            .filter(|n| self.health.is_in_ring(n.id()))
            .cloned()
            .collect()
    }
}

impl<C, P: Partitioner> std::fmt::Debug for KeyBalancer<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBalancer")
            .field("working", &**self.working.load())
            .field("recovery", &**self.recovery.load())
            .finish()
    }
}
