//! Async quorum executor.
//!
//! Every member is called concurrently as its own tokio task. The executor
//! resolves with the first success; failures are only surfaced once every
//! member has completed. Members still running when a success arrives are
//! left to finish on their own and still record their outcome.
//!
//! # Failure tie-break
//!
//! When all members fail, the returned error carries the failure that was
//! observed last, in completion order.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corelib::{CallError, HealthRegistry, KeyBalancer, NodeHandle, Partitioner};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

use crate::context::{CallContext, MemberOutcome};
use crate::error::{QuorumError, Result};
use crate::plan::{Member, QuorumPlan};
use crate::transport::AsyncConnect;

pub struct AsyncQuorumExecutor<C, P = corelib::partitioner::Md5Partitioner> {
    balancer: Arc<KeyBalancer<C, P>>,
    max_wait: Duration,
}

impl<C, P> AsyncQuorumExecutor<C, P>
where
    C: AsyncConnect,
    P: Partitioner,
{
    /// `max_wait` bounds each member's wait for a connection.
    pub fn new(balancer: Arc<KeyBalancer<C, P>>, max_wait: Duration) -> Self {
        Self { balancer, max_wait }
    }

    pub fn balancer(&self) -> &Arc<KeyBalancer<C, P>> {
        &self.balancer
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Call `op` on the quorum for `key` and return the first success.
    ///
    /// `op` receives a fresh connection and a clone of `ctx`.
    pub async fn execute<T, F, Fut>(&self, key: &[u8], ctx: &CallContext, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(C::Connection, CallContext) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = std::result::Result<T, CallError>> + Send + 'static,
    {
        let plan = QuorumPlan::resolve(&self.balancer, key, Instant::now());
        self.execute_plan(plan, ctx, op).await
    }

    /// Same as [`execute`](Self::execute) over an already resolved plan.
    pub async fn execute_plan<T, F, Fut>(
        &self,
        plan: QuorumPlan<C>,
        ctx: &CallContext,
        op: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(C::Connection, CallContext) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = std::result::Result<T, CallError>> + Send + 'static,
    {
        if plan.is_empty() {
            metrics::counter!("routing_quorum_no_route_total").increment(1);
            debug!("quorum empty, no route");
            return Err(QuorumError::NoRoute);
        }

        let mut pending = FuturesUnordered::new();
        for member in plan.into_members() {
            if member.test_request {
                metrics::counter!("routing_probe_dispatched_total").increment(1);
                debug!(node = %member.handle.id(), "dispatching recovery probe");
            }
            pending.push(tokio::spawn(run_member(
                member,
                Arc::clone(self.balancer.health()),
                ctx.clone(),
                self.max_wait,
                op.clone(),
            )));
        }

        let attempts = pending.len();
        let mut last = None;
        while let Some(joined) = pending.next().await {
            match joined {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => last = Some(err),
                Err(err) => {
                    last = Some(CallError::Transport(format!("member task failed: {err}")))
                }
            }
        }

        metrics::counter!("routing_quorum_exhausted_total").increment(1);
        let last = last.unwrap_or_else(|| CallError::Transport("no member completed".into()));
        debug!(attempts, error = %last, "quorum exhausted");
        Err(QuorumError::Exhausted { attempts, last })
    }
}

/// Call one member, then account and report the outcome.
async fn run_member<C, T, F, Fut>(
    member: Member<C>,
    health: Arc<HealthRegistry>,
    ctx: CallContext,
    max_wait: Duration,
    op: F,
) -> std::result::Result<T, CallError>
where
    C: AsyncConnect,
    F: Fn(C::Connection, CallContext) -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let started = Instant::now();
    let result = call_member(&member.handle, max_wait, ctx.clone(), op).await;

    let outcome = result.as_ref().map(|_| ());
    let recorded = if member.test_request {
        health.record_test_request(member.handle.id(), outcome)
    } else {
        health.record(member.handle.id(), outcome)
    };
    ctx.report(&MemberOutcome {
        node: member.handle.id().clone(),
        test_request: member.test_request,
        elapsed: started.elapsed(),
        error: result.as_ref().err().cloned(),
        recorded,
    });
    result
}

async fn call_member<C, T, F, Fut>(
    handle: &NodeHandle<C>,
    max_wait: Duration,
    ctx: CallContext,
    op: F,
) -> std::result::Result<T, CallError>
where
    C: AsyncConnect,
    F: Fn(C::Connection, CallContext) -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let connection = match tokio::time::timeout(max_wait, handle.client().connect()).await {
        Ok(connection) => connection?,
        Err(_) => return Err(CallError::Timeout { waited: max_wait }),
    };
    op(connection, ctx).await
}
