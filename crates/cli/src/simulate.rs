//! In-process failure simulation.
//!
//! Builds a service of fake nodes behind a [`ServiceRouter`], sends batches
//! of keyed calls through the async quorum executor and runs one maintenance
//! pass after each batch. The clock handed to probes and maintenance is
//! simulated: every batch advances it by one probe interval, so exclusions,
//! probes and restorations all show up within a handful of batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::Args;
use corelib::health::Transition;
use corelib::{CallError, Node, RoutingConfig};
use discovery::{ClientFactory, DiscoveredNode, Maintenance, ServiceRouter};
use quorum::{
    AsyncConnect, AsyncQuorumExecutor, CallContext, QuorumError, QuorumPlan, TraceContext,
};
use tracing::info;

use crate::commands::CommandResult;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of nodes, named node-1..node-K
    #[arg(long, default_value_t = 5)]
    pub nodes: usize,

    /// Node id that refuses every call, repeatable
    #[arg(long = "fail")]
    pub fail: Vec<String>,

    /// Calls per batch
    #[arg(long, default_value_t = 200)]
    pub requests: usize,

    #[arg(long, default_value_t = 6)]
    pub batches: usize,

    /// Failing nodes start answering after this many batches
    #[arg(long)]
    pub heal_after: Option<usize>,
}

struct SimNode {
    id: String,
    failing: bool,
    healed: Arc<AtomicBool>,
}

struct SimConnection {
    id: String,
}

#[async_trait]
impl AsyncConnect for SimNode {
    type Connection = SimConnection;

    async fn connect(&self) -> Result<SimConnection, CallError> {
        if self.failing && !self.healed.load(Ordering::Relaxed) {
            return Err(CallError::Connect(format!("{} refused connection", self.id)));
        }
        Ok(SimConnection {
            id: self.id.clone(),
        })
    }
}

async fn echo(conn: SimConnection, _ctx: CallContext) -> Result<String, CallError> {
    Ok(conn.id)
}

#[derive(Debug, Default)]
struct BatchStats {
    ok: usize,
    no_route: usize,
    exhausted: usize,
    probes: usize,
}

pub fn run(args: &SimulateArgs, config: &RoutingConfig) -> anyhow::Result<CommandResult> {
    if args.nodes == 0 {
        bail!("--nodes must be > 0");
    }
    let ids: Vec<String> = (1..=args.nodes).map(|i| format!("node-{i}")).collect();
    for id in &args.fail {
        if !ids.contains(id) {
            bail!("--fail {id}: no such node (expected node-1..node-{})", args.nodes);
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(simulate(args, config, ids))
}

async fn simulate(
    args: &SimulateArgs,
    config: &RoutingConfig,
    ids: Vec<String>,
) -> anyhow::Result<CommandResult> {
    let healed = Arc::new(AtomicBool::new(false));
    let failing = args.fail.clone();
    let factory_healed = Arc::clone(&healed);
    let factory: Arc<dyn ClientFactory<SimNode>> =
        Arc::new(move |node: &Node| -> discovery::Result<SimNode> {
            Ok(SimNode {
                id: node.id.to_string(),
                failing: failing.iter().any(|f| f == node.id.as_str()),
                healed: Arc::clone(&factory_healed),
            })
        });

    let router = Arc::new(ServiceRouter::new("simulated", config.clone(), factory)?);
    let listed = ids
        .iter()
        .enumerate()
        .map(|(i, id)| DiscoveredNode::new(id.as_str(), format!("127.0.0.1:{}", 9000 + i)))
        .collect();
    router.apply(listed)?;

    let keys = Arc::clone(router.key_balancer());
    let executor = AsyncQuorumExecutor::new(Arc::clone(&keys), config.max_wait_for_connection());
    let maintenance = Maintenance::new(Arc::clone(&router), config.health_check_interval());
    let ctx = CallContext::default().with_trace(TraceContext::new("routectl-simulate", "0"));

    let mut out = CommandResult::default();
    out.push(format!(
        "simulating {} nodes, failing {:?}, {} calls x {} batches",
        args.nodes, args.fail, args.requests, args.batches
    ));

    let start = Instant::now();
    let mut request = 0usize;
    for batch in 1..=args.batches {
        if args.heal_after.is_some_and(|n| batch > n) && !healed.swap(true, Ordering::Relaxed) {
            out.push(format!("batch {batch}: failing nodes healed"));
        }
        let clock = start + config.probe_interval() * batch as u32;

        let mut stats = BatchStats::default();
        for _ in 0..args.requests {
            let key = format!("key-{request}");
            request += 1;
            let plan = QuorumPlan::resolve(&keys, key.as_bytes(), clock);
            stats.probes += plan.probe_count();
            match executor.execute_plan(plan, &ctx, echo).await {
                Ok(_) => stats.ok += 1,
                Err(QuorumError::NoRoute) => stats.no_route += 1,
                Err(QuorumError::Exhausted { .. }) => stats.exhausted += 1,
            }
        }

        let transitions = maintenance.tick(clock);
        let working: Vec<String> = keys
            .working_ring()
            .nodes()
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        info!(batch, ok = stats.ok, exhausted = stats.exhausted, "batch complete");
        out.push(format!(
            "batch {batch}: ok={} no_route={} exhausted={} probes={} working=[{}]",
            stats.ok,
            stats.no_route,
            stats.exhausted,
            stats.probes,
            working.join(", ")
        ));
        for (id, transition) in transitions {
            match transition {
                Transition::Excluded { failure_ratio } => {
                    out.push(format!("  {id} excluded (failure ratio {failure_ratio:.2})"))
                }
                Transition::Restored => out.push(format!("  {id} restored")),
            }
        }
    }
    Ok(out)
}
