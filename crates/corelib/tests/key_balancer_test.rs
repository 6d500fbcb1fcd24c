//! Tests for the dual-ring key balancer: exclusion, probing and recovery.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use corelib::health::Transition;
use corelib::node::{handles_from_ids, NodeId};
use corelib::{CallError, Error, KeyBalancer, RoutingConfig};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

fn config() -> RoutingConfig {
    RoutingConfig {
        quorum_size: 3,
        virtual_nodes_per_physical_node: 16,
        min_requests_per_window: 4,
        probe_interval_secs: PROBE_INTERVAL.as_secs(),
        ..RoutingConfig::default()
    }
}

fn balancer(ids: &[&str]) -> KeyBalancer<()> {
    KeyBalancer::new(handles_from_ids(ids.iter().copied()), &config()).unwrap()
}

fn ids(handles: &[corelib::SharedHandle<()>]) -> Vec<String> {
    handles.iter().map(|h| h.id().to_string()).collect()
}

/// Fail `id` hard enough to trip the breaker at `now`.
fn trip(balancer: &KeyBalancer<()>, id: &str, now: Instant) {
    let id = NodeId::new(id);
    let err = CallError::Connect("refused".into());
    for _ in 0..10 {
        balancer.health().record(&id, Err(&err));
    }
    let transitions = balancer.evaluate_health(now).unwrap();
    assert_eq!(
        transitions,
        vec![(id, Transition::Excluded { failure_ratio: 1.0 })]
    );
}

#[test]
fn test_healthy_rings_match() {
    let balancer = balancer(&["a", "b", "c"]);
    assert_eq!(balancer.working_ring().node_count(), 3);
    assert_eq!(balancer.recovery_ring().node_count(), 3);
    for i in 0..100 {
        let key = format!("key-{i}");
        assert_eq!(
            ids(&balancer.get_quorum(key.as_bytes())),
            ids(&balancer.recovery_ring().get_quorum(key.as_bytes()))
        );
        assert!(balancer.get_quorum_by_key_recovery(key.as_bytes()).is_empty());
    }
}

#[test]
fn test_excluded_node_leaves_working_ring_only() {
    let balancer = balancer(&["a", "b", "c", "d"]);
    trip(&balancer, "b", Instant::now());

    assert_eq!(balancer.working_ring().node_count(), 3);
    assert_eq!(balancer.recovery_ring().node_count(), 4);
    for i in 0..200 {
        let key = format!("key-{i}");
        let working = ids(&balancer.get_quorum(key.as_bytes()));
        assert_eq!(working.len(), 3);
        assert!(!working.contains(&"b".to_string()));
        assert_ne!(
            balancer.get_node(key.as_bytes()).map(|h| h.id().to_string()),
            Some("b".to_string())
        );
    }
}

#[test]
fn test_recovery_quorum_only_when_probe_due() {
    let balancer = balancer(&["a", "b", "c"]);
    let start = Instant::now();
    trip(&balancer, "b", start);

    // every key's quorum holds all three nodes
    let key = b"user:1";
    assert!(balancer
        .get_quorum_by_key_recovery_at(key, start + Duration::from_secs(1))
        .is_empty());

    let due = start + PROBE_INTERVAL + Duration::from_secs(1);
    let quorum = balancer.get_quorum_by_key_recovery_at(key, due);
    assert_eq!(quorum.len(), 3);
    assert!(ids(&quorum).contains(&"b".to_string()));

    // the slot is taken until the next interval
    assert!(balancer.get_quorum_by_key_recovery_at(key, due).is_empty());
    assert!(balancer.probe_candidates_at(key, due).is_empty());
    let next = due + PROBE_INTERVAL;
    assert_eq!(ids(&balancer.probe_candidates_at(key, next)), vec!["b"]);
}

#[test]
fn test_test_request_success_restores_node() {
    let balancer = balancer(&["a", "b", "c"]);
    trip(&balancer, "b", Instant::now());
    assert_eq!(balancer.working_ring().node_count(), 2);

    let b = NodeId::new("b");
    balancer.health().record_test_request(&b, Ok(()));
    let transitions = balancer.evaluate_health(Instant::now()).unwrap();
    assert_eq!(transitions, vec![(b, Transition::Restored)]);
    assert_eq!(balancer.working_ring().node_count(), 3);
}

#[test]
fn test_ordinary_success_does_not_restore_node() {
    let balancer = balancer(&["a", "b", "c"]);
    let start = Instant::now();
    trip(&balancer, "b", start);

    // a slow call that started before the exclusion finishes late
    let b = NodeId::new("b");
    balancer.health().record(&b, Ok(()));
    let transitions = balancer
        .evaluate_health(start + Duration::from_millis(1))
        .unwrap();
    assert!(transitions.is_empty());
    assert_eq!(balancer.working_ring().node_count(), 2);
    assert!(!balancer.health().is_in_ring(&b));
}

#[test]
fn test_probe_failure_keeps_node_out() {
    let balancer = balancer(&["a", "b", "c"]);
    trip(&balancer, "b", Instant::now());

    let b = NodeId::new("b");
    balancer
        .health()
        .record(&b, Err(&CallError::Timeout { waited: Duration::from_millis(500) }));
    assert!(balancer.evaluate_health(Instant::now()).unwrap().is_empty());
    assert_eq!(balancer.working_ring().node_count(), 2);
}

#[test]
fn test_all_excluded_has_no_route() {
    let balancer = balancer(&["a", "b"]);
    let now = Instant::now();
    trip(&balancer, "a", now);
    trip(&balancer, "b", now);

    assert!(balancer.working_ring().is_empty());
    assert!(balancer.get_quorum(b"key").is_empty());
    assert!(balancer.get_node(b"key").is_none());
    assert_eq!(balancer.recovery_ring().node_count(), 2);
}

#[test]
fn test_update_nodes_keeps_surviving_health() {
    let balancer = balancer(&["a", "b", "c"]);
    trip(&balancer, "b", Instant::now());

    balancer
        .update_nodes(handles_from_ids(["a", "b", "d"]))
        .unwrap();

    let working: Vec<String> = balancer
        .working_ring()
        .nodes()
        .iter()
        .map(|h| h.id().to_string())
        .collect();
    assert_eq!(working, vec!["a", "d"]);
    assert_eq!(balancer.recovery_ring().node_count(), 3);
    assert!(balancer.health().get(&NodeId::new("c")).is_none());
    assert!(balancer.health().is_in_ring(&NodeId::new("d")));
    assert!(!balancer.health().is_in_ring(&NodeId::new("b")));
    assert_eq!(balancer.nodes().len(), 3);
}

#[test]
fn test_rejected_update_publishes_nothing() {
    let balancer = balancer(&["a", "b"]);
    let err = balancer
        .update_nodes(handles_from_ids(["x", "x"]))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateNode(_)));
    assert_eq!(ids(&balancer.nodes()), vec!["a", "b"]);
    assert_eq!(balancer.recovery_ring().node_count(), 2);
}

#[test]
fn test_invalid_config_rejected() {
    let config = RoutingConfig {
        quorum_size: 0,
        ..RoutingConfig::default()
    };
    let result = KeyBalancer::new(handles_from_ids(["a"]), &config);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_concurrent_readers_during_update() {
    let balancer = Arc::new(balancer(&["a", "b", "c", "d"]));

    let readers: Vec<_> = (0..4)
        .map(|r| {
            let balancer = Arc::clone(&balancer);
            thread::spawn(move || {
                for i in 0..20_000 {
                    let key = format!("key-{r}-{i}");
                    let quorum = ids(&balancer.get_quorum(key.as_bytes()));
                    assert!(!quorum.is_empty() && quorum.len() <= 3);
                    let unique: HashSet<&String> = quorum.iter().collect();
                    assert_eq!(unique.len(), quorum.len());
                    assert!(balancer.get_node(key.as_bytes()).is_some());
                }
            })
        })
        .collect();

    for round in 0..500 {
        let next = if round % 2 == 0 {
            handles_from_ids(["a", "b", "e"])
        } else {
            handles_from_ids(["a", "b", "c", "d"])
        };
        balancer.update_nodes(next).unwrap();
        balancer.rebalance().unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(balancer.working_ring().node_count(), 4);
}
