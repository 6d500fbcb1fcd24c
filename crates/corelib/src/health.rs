//! Per-node health tracking and circuit breaking.
//!
//! Callers report every call outcome with plain atomic increments. A periodic
//! evaluation (driven by a background task, never by callers) closes each
//! window, computes the failure ratio and moves nodes between two states:
//!
//! ```text
//!            ratio > threshold
//!   WORKING ------------------> EXCLUDED
//!      ^                           |
//!      +---------------------------+
//!     a test request succeeded during the window
//! ```
//!
//! Excluded nodes stay in the recovery ring and get a throttled trickle of
//! probe traffic through [`NodeHealth::should_send_test_request`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::{ErrorPredicate, RoutingConfig};
use crate::error::CallError;
use crate::node::NodeId;

/// Decides which errors are excluded from failure accounting.
#[derive(Clone, Default)]
pub struct ErrorFilter {
    kinds: Arc<[String]>,
    predicate: Option<ErrorPredicate>,
}

impl ErrorFilter {
    pub fn new(kinds: Vec<String>, predicate: Option<ErrorPredicate>) -> Self {
        Self {
            kinds: kinds.into(),
            predicate,
        }
    }

    pub fn is_ignored(&self, err: &CallError) -> bool {
        if let Some(kind) = err.kind() {
            if self.kinds.iter().any(|k| k == kind) {
                return true;
            }
        }
        self.predicate.as_ref().is_some_and(|predicate| predicate(err))
    }
}

impl fmt::Debug for ErrorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorFilter")
            .field("kinds", &self.kinds)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Circuit-breaker parameters shared by every node of a registry.
#[derive(Clone, Debug)]
pub struct HealthPolicy {
    pub failure_ratio_threshold: f64,
    pub min_requests: u32,
    pub probe_interval: Duration,
    pub filter: ErrorFilter,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        RoutingConfig::default().health_policy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// In the working ring, normal traffic.
    Working,
    /// Out of the working ring, probe traffic only.
    Excluded,
}

/// State change produced by [`NodeHealth::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Excluded { failure_ratio: f64 },
    Restored,
}

/// How an outcome was accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Success,
    Failure,
    /// Matched the error filter; not counted.
    Ignored,
}

/// Health record of one node.
///
/// Every method is lock-free. Timestamps are kept as milliseconds since the
/// record was created.
pub struct NodeHealth {
    epoch: Instant,
    probe_interval_ms: u64,
    successes: AtomicU32,
    failures: AtomicU32,
    in_ring: AtomicBool,
    recovered: AtomicBool,
    next_probe_ms: AtomicU64,
    last_ratio: AtomicU64,
}

impl NodeHealth {
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            probe_interval_ms: probe_interval.as_millis() as u64,
            successes: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            in_ring: AtomicBool::new(true),
            recovered: AtomicBool::new(false),
            next_probe_ms: AtomicU64::new(0),
            last_ratio: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Whether the node belongs in the working ring.
    #[inline]
    pub fn is_in_ring(&self) -> bool {
        self.in_ring.load(Ordering::Acquire)
    }

    pub fn state(&self) -> HealthState {
        if self.is_in_ring() {
            HealthState::Working
        } else {
            HealthState::Excluded
        }
    }

    /// Failure ratio of the last evaluated window.
    pub fn failure_ratio(&self) -> f64 {
        f64::from_bits(self.last_ratio.load(Ordering::Relaxed))
    }

    /// Ordinary successes only count while the node is in the working ring.
    pub fn record_success(&self) {
        if self.is_in_ring() {
            self.successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Success of a call issued under a slot from
    /// [`should_send_test_request`](Self::should_send_test_request). Marks an
    /// excluded node for restoration at the next evaluation.
    pub fn record_test_success(&self) {
        if self.is_in_ring() {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.recovered.store(true, Ordering::Release);
        }
    }

    /// Failures of an excluded node are probe failures; they only keep it
    /// excluded.
    pub fn record_failure(&self) {
        if self.is_in_ring() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Claim a probe slot for this node.
    ///
    /// Returns `true` at most once per probe interval, and only while the node
    /// is excluded. The first slot opens one interval after exclusion.
    pub fn should_send_test_request(&self) -> bool {
        self.should_send_test_request_at(Instant::now())
    }

    pub fn should_send_test_request_at(&self, now: Instant) -> bool {
        if self.is_in_ring() {
            return false;
        }
        let now_ms = self.millis(now);
        let due = self.next_probe_ms.load(Ordering::Acquire);
        if now_ms < due {
            return false;
        }
        self.next_probe_ms
            .compare_exchange(
                due,
                now_ms + self.probe_interval_ms,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Close the current window and apply any state change.
    pub fn evaluate(&self, policy: &HealthPolicy, now: Instant) -> Option<Transition> {
        let successes = self.successes.swap(0, Ordering::AcqRel);
        let failures = self.failures.swap(0, Ordering::AcqRel);

        if !self.is_in_ring() {
            if self.recovered.swap(false, Ordering::AcqRel) {
                self.last_ratio.store(0f64.to_bits(), Ordering::Relaxed);
                self.in_ring.store(true, Ordering::Release);
                return Some(Transition::Restored);
            }
            return None;
        }

        let total = u64::from(successes) + u64::from(failures);
        if total == 0 {
            return None;
        }
        let ratio = f64::from(failures) / total as f64;
        self.last_ratio.store(ratio.to_bits(), Ordering::Relaxed);

        if total >= u64::from(policy.min_requests) && ratio > policy.failure_ratio_threshold {
            self.recovered.store(false, Ordering::Release);
            self.next_probe_ms
                .store(self.millis(now) + self.probe_interval_ms, Ordering::Release);
            self.in_ring.store(false, Ordering::Release);
            return Some(Transition::Excluded {
                failure_ratio: ratio,
            });
        }
        None
    }

    fn millis(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }
}

impl fmt::Debug for NodeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHealth")
            .field("state", &self.state())
            .field("failure_ratio", &self.failure_ratio())
            .finish()
    }
}

/// Health records for every known node of a service.
#[derive(Debug)]
pub struct HealthRegistry {
    policy: HealthPolicy,
    nodes: DashMap<NodeId, Arc<NodeHealth>>,
}

impl HealthRegistry {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            nodes: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Get the record for `id`, creating a healthy one if needed.
    pub fn track(&self, id: &NodeId) -> Arc<NodeHealth> {
        if let Some(health) = self.nodes.get(id) {
            return Arc::clone(&health);
        }
        let entry = self
            .nodes
            .entry(id.clone())
            .or_insert_with(|| Arc::new(NodeHealth::new(self.policy.probe_interval)));
        Arc::clone(&entry)
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<NodeHealth>> {
        self.nodes.get(id).map(|h| Arc::clone(&h))
    }

    /// Drop records of nodes not in `ids`.
    pub fn retain(&self, ids: &[NodeId]) {
        self.nodes.retain(|id, _| ids.contains(id));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Unknown nodes count as healthy.
    pub fn is_in_ring(&self, id: &NodeId) -> bool {
        self.nodes.get(id).map_or(true, |h| h.is_in_ring())
    }

    /// Account one call outcome against `id`.
    ///
    /// A success never restores an excluded node here; see
    /// [`record_test_request`](Self::record_test_request).
    pub fn record(&self, id: &NodeId, outcome: Result<(), &CallError>) -> Recorded {
        self.account(id, outcome, false)
    }

    /// Account the outcome of a test request sent to an excluded node.
    pub fn record_test_request(&self, id: &NodeId, outcome: Result<(), &CallError>) -> Recorded {
        self.account(id, outcome, true)
    }

    fn account(&self, id: &NodeId, outcome: Result<(), &CallError>, test_request: bool) -> Recorded {
        let recorded = match outcome {
            Ok(()) => Recorded::Success,
            Err(err) if self.policy.filter.is_ignored(err) => Recorded::Ignored,
            Err(_) => Recorded::Failure,
        };
        if let Some(health) = self.nodes.get(id) {
            match recorded {
                Recorded::Success if test_request => health.record_test_success(),
                Recorded::Success => health.record_success(),
                Recorded::Failure => health.record_failure(),
                Recorded::Ignored => {}
            }
        }
        recorded
    }

    /// Evaluate every node; returns the transitions, sorted by node id.
    pub fn evaluate_all(&self, now: Instant) -> Vec<(NodeId, Transition)> {
        let mut transitions = Vec::new();
        for entry in self.nodes.iter() {
            if let Some(transition) = entry.value().evaluate(&self.policy, now) {
                transitions.push((entry.key().clone(), transition));
            }
        }
        transitions.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, transition) in &transitions {
            match transition {
                Transition::Excluded { failure_ratio } => {
                    warn!(node = %id, failure_ratio, "node excluded from working ring");
                    metrics::counter!("routing_node_excluded_total").increment(1);
                }
                Transition::Restored => {
                    info!(node = %id, "node restored to working ring");
                    metrics::counter!("routing_node_restored_total").increment(1);
                }
            }
        }
        if transitions.is_empty() {
            debug!(nodes = self.nodes.len(), "health evaluated, no transitions");
        }
        transitions
    }
}
