//! Member resolution for a quorum call.

use std::time::Instant;

use corelib::{KeyBalancer, NodeId, Partitioner, SharedHandle};

/// One node a quorum call will be sent to.
#[derive(Debug)]
pub struct Member<C> {
    pub handle: SharedHandle<C>,
    /// Excluded node granted a test-request slot for this call.
    pub test_request: bool,
}

impl<C> Clone for Member<C> {
    fn clone(&self) -> Self {
        Self {
            handle: SharedHandle::clone(&self.handle),
            test_request: self.test_request,
        }
    }
}

/// Ordered members of one quorum call.
///
/// Working-ring members come first in quorum order, followed by recovery
/// probes that are not already present.
#[derive(Debug)]
pub struct QuorumPlan<C> {
    members: Vec<Member<C>>,
}

impl<C> QuorumPlan<C> {
    /// Resolve the members for `key` at `now`.
    ///
    /// Claims probe slots, so resolve once per call.
    pub fn resolve<P: Partitioner>(
        balancer: &KeyBalancer<C, P>,
        key: &[u8],
        now: Instant,
    ) -> Self {
        let mut members: Vec<Member<C>> = balancer
            .get_quorum(key)
            .into_iter()
            .map(|handle| Member {
                handle,
                test_request: false,
            })
            .collect();

        for handle in balancer.probe_candidates_at(key, now) {
            if members.iter().any(|m| m.handle.id() == handle.id()) {
                continue;
            }
            members.push(Member {
                handle,
                test_request: true,
            });
        }
        Self { members }
    }

    /// A plan over explicit handles, none of them probes.
    pub fn from_handles(handles: Vec<SharedHandle<C>>) -> Self {
        Self {
            members: handles
                .into_iter()
                .map(|handle| Member {
                    handle,
                    test_request: false,
                })
                .collect(),
        }
    }

    pub fn members(&self) -> &[Member<C>] {
        &self.members
    }

    pub fn into_members(self) -> Vec<Member<C>> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.members.iter().map(|m| m.handle.id().clone()).collect()
    }

    pub fn probe_count(&self) -> usize {
        self.members.iter().filter(|m| m.test_request).count()
    }
}
