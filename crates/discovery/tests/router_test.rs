//! Tests for discovery-driven routing updates and maintenance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use corelib::health::Transition;
use corelib::{BalancerKind, CallError, Node, NodeId, RoutingConfig};
use discovery::{
    ClientFactory, DiscoveredNode, DiscoveryError, DiscoveryListener, Maintenance,
    RouterUpdate, ServiceRouter, StaticDiscovery,
};

/// Client stand-in: remembers which build produced it.
#[derive(Debug)]
struct Client {
    address: String,
    build: usize,
}

fn factory(builds: Arc<AtomicUsize>) -> Arc<dyn ClientFactory<Client>> {
    Arc::new(move |node: &Node| {
        if node.address.starts_with("bad") {
            return Err(DiscoveryError::ClientCreation {
                node: node.id.to_string(),
                reason: "unroutable".into(),
            });
        }
        Ok(Client {
            address: node.address.clone(),
            build: builds.fetch_add(1, Ordering::SeqCst),
        })
    })
}

fn config() -> RoutingConfig {
    RoutingConfig {
        virtual_nodes_per_physical_node: 16,
        min_requests_per_window: 2,
        ..RoutingConfig::default()
    }
}

fn router() -> (ServiceRouter<Client>, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let router = ServiceRouter::new("users", config(), factory(Arc::clone(&builds))).unwrap();
    (router, builds)
}

fn listed(ids: &[(&str, &str)]) -> Vec<DiscoveredNode> {
    ids.iter()
        .map(|(id, address)| DiscoveredNode::new(*id, *address))
        .collect()
}

fn node_ids(router: &ServiceRouter<Client>) -> Vec<String> {
    router
        .key_balancer()
        .nodes()
        .iter()
        .map(|h| h.id().to_string())
        .collect()
}

#[test]
fn test_empty_router_has_no_route() {
    let (router, _) = router();
    assert!(router.get().is_none());
    assert!(router.get_quorum(b"key").is_empty());
    assert_eq!(router.balancer().kind(), BalancerKind::Empty);
}

#[test]
fn test_apply_sorts_and_builds() {
    let (router, builds) = router();
    let update = router
        .apply(listed(&[("c", "10.0.0.3:1"), ("a", "10.0.0.1:1"), ("b", "10.0.0.2:1")]))
        .unwrap();

    assert_eq!(
        update,
        RouterUpdate {
            added: 3,
            removed: 0,
            kept: 0,
            skipped: 0
        }
    );
    assert_eq!(node_ids(&router), vec!["a", "b", "c"]);
    assert_eq!(builds.load(Ordering::SeqCst), 3);
    assert_eq!(router.get_quorum(b"key").len(), 3);
    assert!(router.get().is_some());
}

#[test]
fn test_unchanged_nodes_keep_their_handles() {
    let (router, builds) = router();
    router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "10.0.0.2:1")]))
        .unwrap();
    let before = router.key_balancer().nodes();

    let update = router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "10.0.0.9:1"), ("d", "10.0.0.4:1")]))
        .unwrap();
    assert_eq!(update.kept, 1);
    assert_eq!(update.added, 2);
    assert_eq!(update.removed, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 4);

    let after = router.key_balancer().nodes();
    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert_eq!(after[1].client().address, "10.0.0.9:1");
    assert_eq!(after[1].client().build, 2);
}

#[test]
fn test_failed_client_and_duplicates_are_skipped() {
    let (router, _) = router();
    let update = router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "bad-host"), ("a", "10.0.0.7:1")]))
        .unwrap();
    assert_eq!(update.skipped, 2);
    assert_eq!(node_ids(&router), vec!["a"]);
    assert_eq!(router.key_balancer().nodes()[0].node().address, "10.0.0.1:1");
}

#[test]
fn test_withdrawn_node_drops_health() {
    let (router, _) = router();
    router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "10.0.0.2:1")]))
        .unwrap();
    let health = Arc::clone(router.key_balancer().health());
    assert_eq!(health.len(), 2);

    router.apply(listed(&[("a", "10.0.0.1:1")])).unwrap();
    assert_eq!(health.len(), 1);
    assert!(health.get(&NodeId::new("b")).is_none());
}

#[test]
fn test_listener_ignores_other_services() {
    let (router, _) = router();
    let router = Arc::new(router);
    let feed = StaticDiscovery::new();
    feed.subscribe(router.clone());

    feed.publish("orders", listed(&[("x", "10.0.0.1:1")]));
    assert!(node_ids(&router).is_empty());

    feed.publish("users", listed(&[("u1", "10.0.0.1:1"), ("u2", "10.0.0.2:1")]));
    assert_eq!(node_ids(&router), vec!["u1", "u2"]);

    let update = router.bootstrap(&feed).unwrap();
    assert_eq!(update.kept, 2);
    assert!(!update.is_change());

    router.on_nodes_changed("users", Vec::new());
    assert!(router.get().is_none());
}

#[test]
fn test_bootstrap_unknown_service() {
    let (router, _) = router();
    let feed = StaticDiscovery::new();
    assert!(matches!(
        router.bootstrap(&feed),
        Err(DiscoveryError::UnknownService(_))
    ));
}

#[test]
fn test_maintenance_excludes_and_zero_weights() {
    let (router, _) = router();
    router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "10.0.0.2:1")]))
        .unwrap();
    let router = Arc::new(router);
    let maintenance = Maintenance::new(Arc::clone(&router), Duration::from_secs(1));

    let b = NodeId::new("b");
    let err = CallError::Connect("refused".into());
    router.key_balancer().health().record(&b, Err(&err));
    router.key_balancer().health().record(&b, Err(&err));

    let transitions = maintenance.tick(Instant::now());
    assert_eq!(
        transitions,
        vec![(b.clone(), Transition::Excluded { failure_ratio: 1.0 })]
    );
    assert_eq!(router.balancer().kind(), BalancerKind::Single);
    assert_eq!(router.balancer().selectable(), vec![NodeId::new("a")]);
    assert_eq!(router.key_balancer().working_ring().node_count(), 1);

    router.key_balancer().health().record_test_request(&b, Ok(()));
    let transitions = maintenance.tick(Instant::now());
    assert_eq!(transitions, vec![(b, Transition::Restored)]);
    assert_eq!(router.balancer().kind(), BalancerKind::WeightedRandom);
    assert_eq!(router.key_balancer().working_ring().node_count(), 2);
}

#[tokio::test]
async fn test_spawned_maintenance_runs_periodically() {
    let (router, _) = router();
    router
        .apply(listed(&[("a", "10.0.0.1:1"), ("b", "10.0.0.2:1")]))
        .unwrap();
    let router = Arc::new(router);

    let b = NodeId::new("b");
    let err = CallError::Connect("refused".into());
    for _ in 0..5 {
        router.key_balancer().health().record(&b, Err(&err));
    }

    let task = Maintenance::new(Arc::clone(&router), Duration::from_millis(20)).spawn();
    let deadline = Instant::now() + Duration::from_secs(5);
    while router.key_balancer().working_ring().node_count() != 1 {
        assert!(Instant::now() < deadline, "maintenance never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    task.abort();

    assert_eq!(router.balancer().selectable(), vec![NodeId::new("a")]);
}
