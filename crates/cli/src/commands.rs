//! Subcommands.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Subcommand, ValueEnum};
use corelib::partitioner::{Md5Partitioner, SipPartitioner, Xxh3Partitioner};
use corelib::weight::normalized;
use corelib::{Balancer, Node, NodeHandle, Partitioner, RingBuilder, RoutingConfig};

use crate::simulate::{self, SimulateArgs};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show quorums for keys and token ownership per node
    Ring(RingArgs),
    /// Sample the weighted balancer and compare with the target weights
    Balance(BalanceArgs),
    /// Drive the async quorum executor against failing in-process nodes
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HashKind {
    Md5,
    Sip,
    Xxh3,
}

#[derive(Debug, Args)]
pub struct RingArgs {
    /// Node id, repeatable
    #[arg(long = "node", required = true)]
    pub nodes: Vec<String>,

    /// Key to look up, repeatable
    #[arg(long = "key")]
    pub keys: Vec<String>,

    /// Virtual nodes per physical node (defaults to the config value)
    #[arg(long)]
    pub vnodes: Option<usize>,

    /// Quorum size (defaults to the config value)
    #[arg(long)]
    pub quorum: Option<usize>,

    #[arg(long, value_enum, default_value_t = HashKind::Md5)]
    pub hash: HashKind,
}

#[derive(Debug, Args)]
pub struct BalanceArgs {
    /// Weighted node as ID=WEIGHT, repeatable
    #[arg(long = "node", required = true, value_parser = parse_weighted)]
    pub nodes: Vec<(String, f64)>,

    #[arg(long, default_value_t = 100_000)]
    pub samples: usize,
}

/// Lines of command output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub lines: Vec<String>,
}

impl CommandResult {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl Command {
    pub fn execute(&self, config: &RoutingConfig) -> anyhow::Result<CommandResult> {
        match self {
            Command::Ring(args) => ring(args, config),
            Command::Balance(args) => balance(args),
            Command::Simulate(args) => simulate::run(args, config),
        }
    }
}

fn ring(args: &RingArgs, config: &RoutingConfig) -> anyhow::Result<CommandResult> {
    let builder = RingBuilder::new()
        .with_vnodes(args.vnodes.unwrap_or(config.virtual_nodes_per_physical_node))
        .with_quorum(args.quorum.unwrap_or(config.quorum_size));
    match args.hash {
        HashKind::Md5 => ring_report(builder.with_partitioner(Arc::new(Md5Partitioner)), args),
        HashKind::Sip => ring_report(builder.with_partitioner(Arc::new(SipPartitioner)), args),
        HashKind::Xxh3 => ring_report(builder.with_partitioner(Arc::new(Xxh3Partitioner)), args),
    }
}

fn ring_report<P: Partitioner>(
    builder: RingBuilder<P>,
    args: &RingArgs,
) -> anyhow::Result<CommandResult> {
    let handles = corelib::node::handles_from_ids(&args.nodes);
    let ring = builder.build(handles).context("failed to build ring")?;

    let mut out = CommandResult::default();
    out.push(format!(
        "ring: {} nodes, {} tokens, quorum {}, {}",
        ring.node_count(),
        ring.token_count(),
        ring.quorum_size(),
        ring.partitioner_name()
    ));
    for key in &args.keys {
        let quorum: Vec<String> = ring
            .get_quorum_ids(key.as_bytes())
            .iter()
            .map(|id| id.to_string())
            .collect();
        let token = builder.partitioner().token(key.as_bytes());
        out.push(format!("{key} (token {token}) -> [{}]", quorum.join(", ")));
    }
    out.push("ownership:".to_string());
    for (id, share) in ring.ownership() {
        out.push(format!("  {id:<24} {:>6.2}%", share * 100.0));
    }
    Ok(out)
}

fn balance(args: &BalanceArgs) -> anyhow::Result<CommandResult> {
    if args.samples == 0 {
        bail!("--samples must be > 0");
    }
    let handles = args
        .nodes
        .iter()
        .map(|(id, weight)| {
            Arc::new(NodeHandle::with_weight(Node::new(id.as_str()), (), *weight))
        })
        .collect();
    let balancer = Balancer::new(handles);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..args.samples {
        if let Some(handle) = balancer.get() {
            *counts.entry(handle.id().to_string()).or_default() += 1;
        }
    }

    let raw: Vec<f64> = args.nodes.iter().map(|(_, w)| *w).collect();
    let targets = normalized(&raw);

    let mut out = CommandResult::default();
    out.push(format!("balancer: {:?}, {} samples", balancer.kind(), args.samples));
    out.push(format!("  {:<16} {:>10} {:>10} {:>10}", "node", "weight", "target", "observed"));
    for ((id, weight), target) in args.nodes.iter().zip(targets) {
        let observed = counts.get(id).copied().unwrap_or(0) as f64 / args.samples as f64;
        out.push(format!(
            "  {id:<16} {weight:>10.4} {target:>10.4} {observed:>10.4}"
        ));
    }
    Ok(out)
}

fn parse_weighted(s: &str) -> Result<(String, f64), String> {
    let (id, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=WEIGHT, got `{s}`"))?;
    if id.is_empty() {
        return Err(format!("empty node id in `{s}`"));
    }
    let weight = weight
        .parse::<f64>()
        .map_err(|e| format!("bad weight in `{s}`: {e}"))?;
    Ok((id.to_string(), weight))
}
