//! Weighted-random node selection.
//!
//! A [`Balancer`] owns a fixed list of node handles and publishes an immutable
//! [`Selector`] describing which of them may be picked and with what
//! probability. `re_balance` builds a new selector off to the side and swaps it
//! in atomically, so `get` never blocks and never observes a half-built table.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::node::{NodeHandle, NodeId, SharedHandle};
use crate::weight::normalize;

/// Nodes whose normalized weight is at or below `EXCLUSION_FACTOR / count`
/// are never selected.
pub const EXCLUSION_FACTOR: f64 = 0.001;

/// Upper bound written into the last cumulative entry so that a draw in
/// `[0, 1)` always lands inside the table despite rounding.
const CUMULATIVE_CEILING: f64 = 2.0;

/// Extracts a raw weight from a handle.
pub type Weigher<C> = Arc<dyn Fn(&NodeHandle<C>) -> f64 + Send + Sync>;

/// Published selection state.
#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Empty,
    Single(usize),
    Weighted {
        /// Index into the balancer's node list for each table entry.
        slots: Vec<usize>,
        /// Prefix sums of normalized weights, last entry forced above 1.
        cumulative: Vec<f64>,
    },
}

/// Which selector variant is currently published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerKind {
    Empty,
    Single,
    WeightedRandom,
}

pub struct Balancer<C> {
    nodes: Vec<SharedHandle<C>>,
    weigher: Weigher<C>,
    selector: ArcSwap<Selector>,
}

impl<C: 'static> Balancer<C> {
    /// Build a balancer that weighs nodes by [`NodeHandle::weight`].
    pub fn new(nodes: Vec<SharedHandle<C>>) -> Self {
        Self::with_weigher(nodes, Arc::new(|handle: &NodeHandle<C>| handle.weight()))
    }

    pub fn with_weigher(nodes: Vec<SharedHandle<C>>, weigher: Weigher<C>) -> Self {
        let selector = build_selector(&nodes, &weigher);
        Self {
            nodes,
            weigher,
            selector: ArcSwap::from_pointee(selector),
        }
    }

    /// Recompute weights and publish a new selector.
    pub fn re_balance(&self) {
        let selector = build_selector(&self.nodes, &self.weigher);
        self.selector.store(Arc::new(selector));
    }

    /// Pick a node at random according to the current weights.
    ///
    /// Returns `None` only when the balancer was built from an empty list.
    #[inline]
    pub fn get(&self) -> Option<&SharedHandle<C>> {
        self.pick(rand::random::<f64>())
    }

    /// Pick the node a given draw in `[0, 1)` selects.
    pub fn pick(&self, draw: f64) -> Option<&SharedHandle<C>> {
        let selector = self.selector.load();
        let slot = match &**selector {
            Selector::Empty => return None,
            Selector::Single(slot) => *slot,
            Selector::Weighted { slots, cumulative } => {
                let idx = cumulative.partition_point(|c| *c < draw);
                slots[idx.min(slots.len() - 1)]
            }
        };
        self.nodes.get(slot)
    }

    /// Every node the balancer was built from, selectable or not.
    pub fn nodes(&self) -> &[SharedHandle<C>] {
        &self.nodes
    }

    /// Ids of the nodes the current selector can return.
    pub fn selectable(&self) -> Vec<NodeId> {
        match &**self.selector.load() {
            Selector::Empty => Vec::new(),
            Selector::Single(slot) => vec![self.nodes[*slot].id().clone()],
            Selector::Weighted { slots, .. } => {
                slots.iter().map(|s| self.nodes[*s].id().clone()).collect()
            }
        }
    }

    pub fn kind(&self) -> BalancerKind {
        match &**self.selector.load() {
            Selector::Empty => BalancerKind::Empty,
            Selector::Single(_) => BalancerKind::Single,
            Selector::Weighted { .. } => BalancerKind::WeightedRandom,
        }
    }
}

impl<C: 'static> fmt::Debug for Balancer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Balancer")
            .field("nodes", &self.nodes.len())
            .field("kind", &self.kind())
            .finish()
    }
}

fn build_selector<C>(nodes: &[SharedHandle<C>], weigher: &Weigher<C>) -> Selector {
    let count = nodes.len();
    match count {
        0 => return Selector::Empty,
        1 => return Selector::Single(0),
        _ => {}
    }

    let mut weights: Vec<(usize, f64)> = nodes
        .iter()
        .enumerate()
        .map(|(slot, handle)| (slot, weigher(handle)))
        .collect();
    normalize(&mut weights);

    let cutoff = EXCLUSION_FACTOR / count as f64;
    let mut kept: Vec<(usize, f64)> = weights.into_iter().filter(|(_, w)| *w > cutoff).collect();
    if kept.is_empty() {
        kept = (0..count).map(|slot| (slot, 1.0)).collect();
    }
    normalize(&mut kept);

    debug!(nodes = count, selectable = kept.len(), "balancer rebuilt");

    if kept.len() == 1 {
        return Selector::Single(kept[0].0);
    }

    let mut slots = Vec::with_capacity(kept.len());
    let mut cumulative = Vec::with_capacity(kept.len());
    let mut running = 0.0;
    for (slot, weight) in kept {
        running += weight;
        slots.push(slot);
        cumulative.push(running);
    }
    if let Some(last) = cumulative.last_mut() {
        *last = CUMULATIVE_CEILING;
    }

    Selector::Weighted { slots, cumulative }
}
