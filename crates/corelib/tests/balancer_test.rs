//! Statistical and concurrency tests for the weighted balancer.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use corelib::balancer::{Balancer, BalancerKind};
use corelib::node::{Node, NodeHandle, SharedHandle};

fn nodes(weights: &[(&str, f64)]) -> Vec<SharedHandle<()>> {
    weights
        .iter()
        .map(|(id, w)| Arc::new(NodeHandle::with_weight(Node::new(*id), (), *w)))
        .collect()
}

#[test]
fn test_selection_frequency_tracks_weights() {
    let balancer = Balancer::new(nodes(&[("a", 6.0), ("b", 3.0), ("c", 1.0)]));
    let samples = 500_000;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..samples {
        let id = balancer.get().unwrap().id().to_string();
        *counts.entry(id).or_default() += 1;
    }

    for (id, expected) in [("a", 0.6), ("b", 0.3), ("c", 0.1)] {
        let observed = counts.get(id).copied().unwrap_or(0) as f64 / samples as f64;
        let error = (observed - expected).abs() / expected;
        assert!(error < 0.05, "{id}: observed {observed:.4}, expected {expected}");
    }
}

#[test]
fn test_excluded_node_never_selected() {
    let balancer = Balancer::new(nodes(&[("a", 1.0), ("b", 1.0), ("tiny", 1e-9)]));
    for _ in 0..200_000 {
        assert_ne!(balancer.get().unwrap().id().as_str(), "tiny");
    }
}

#[test]
fn test_threshold_is_inclusive() {
    // "edge" normalizes to the cutoff itself, 0.001 / 2
    let edge = 0.001 / 2.0;
    let balancer = Balancer::new(nodes(&[("main", 1.0 - edge), ("edge", edge)]));
    assert_eq!(balancer.kind(), BalancerKind::Single);
}

#[test]
fn test_degenerate_weights_fall_back_to_uniform() {
    let balancer = Balancer::new(nodes(&[("a", f64::NAN), ("b", 0.0), ("c", -1.0)]));
    assert_eq!(balancer.kind(), BalancerKind::WeightedRandom);
    assert_eq!(balancer.selectable().len(), 3);
}

#[test]
fn test_concurrent_readers_during_rebalance() {
    let balancer = Arc::new(Balancer::new(nodes(&[("a", 1.0), ("b", 1.0), ("c", 1.0)])));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let balancer = Arc::clone(&balancer);
            thread::spawn(move || {
                for _ in 0..50_000 {
                    assert!(balancer.get().is_some());
                }
            })
        })
        .collect();

    for round in 0..1_000 {
        let weight = if round % 2 == 0 { 0.0 } else { 1.0 };
        balancer.nodes()[0].set_weight(weight);
        balancer.re_balance();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(balancer.nodes().len(), 3);
}
