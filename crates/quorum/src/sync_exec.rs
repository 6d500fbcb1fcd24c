//! Blocking quorum executor.
//!
//! Members are tried one at a time, in quorum order, on the caller's thread.
//! The first success is returned; the remaining members are never called.

use std::sync::Arc;
use std::time::{Duration, Instant};

use corelib::{CallError, KeyBalancer, Partitioner};
use tracing::debug;

use crate::context::{CallContext, MemberOutcome};
use crate::error::{QuorumError, Result};
use crate::plan::{Member, QuorumPlan};
use crate::transport::BlockingConnect;

pub struct SyncQuorumExecutor<C, P = corelib::partitioner::Md5Partitioner> {
    balancer: Arc<KeyBalancer<C, P>>,
    max_wait: Duration,
}

impl<C, P> SyncQuorumExecutor<C, P>
where
    C: BlockingConnect,
    P: Partitioner,
{
    pub fn new(balancer: Arc<KeyBalancer<C, P>>, max_wait: Duration) -> Self {
        Self { balancer, max_wait }
    }

    pub fn balancer(&self) -> &Arc<KeyBalancer<C, P>> {
        &self.balancer
    }

    pub fn execute<T, F>(&self, key: &[u8], ctx: &CallContext, op: F) -> Result<T>
    where
        F: FnMut(C::Connection, &CallContext) -> std::result::Result<T, CallError>,
    {
        let plan = QuorumPlan::resolve(&self.balancer, key, Instant::now());
        self.execute_plan(plan, ctx, op)
    }

    pub fn execute_plan<T, F>(
        &self,
        plan: QuorumPlan<C>,
        ctx: &CallContext,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(C::Connection, &CallContext) -> std::result::Result<T, CallError>,
    {
        if plan.is_empty() {
            metrics::counter!("routing_quorum_no_route_total").increment(1);
            debug!("quorum empty, no route");
            return Err(QuorumError::NoRoute);
        }

        let attempts = plan.len();
        let mut last = None;
        for member in plan.into_members() {
            if member.test_request {
                metrics::counter!("routing_probe_dispatched_total").increment(1);
                debug!(node = %member.handle.id(), "dispatching recovery probe");
            }
            match self.run_member(&member, ctx, &mut op) {
                Ok(value) => return Ok(value),
                Err(err) => last = Some(err),
            }
        }

        metrics::counter!("routing_quorum_exhausted_total").increment(1);
        let last = last.unwrap_or_else(|| CallError::Transport("no member completed".into()));
        debug!(attempts, error = %last, "quorum exhausted");
        Err(QuorumError::Exhausted { attempts, last })
    }

    fn run_member<T, F>(
        &self,
        member: &Member<C>,
        ctx: &CallContext,
        op: &mut F,
    ) -> std::result::Result<T, CallError>
    where
        F: FnMut(C::Connection, &CallContext) -> std::result::Result<T, CallError>,
    {
        let started = Instant::now();
        let result = self.connect(member, started).and_then(|conn| op(conn, ctx));

        let id = member.handle.id();
        let outcome = result.as_ref().map(|_| ());
        let health = self.balancer.health();
        let recorded = if member.test_request {
            health.record_test_request(id, outcome)
        } else {
            health.record(id, outcome)
        };
        ctx.report(&MemberOutcome {
            node: id.clone(),
            test_request: member.test_request,
            elapsed: started.elapsed(),
            error: result.as_ref().err().cloned(),
            recorded,
        });
        result
    }

    fn connect(
        &self,
        member: &Member<C>,
        started: Instant,
    ) -> std::result::Result<C::Connection, CallError> {
        let connection = member.handle.client().connect(self.max_wait)?;
        let waited = started.elapsed();
        if waited > self.max_wait {
            return Err(CallError::Timeout { waited });
        }
        Ok(connection)
    }
}
