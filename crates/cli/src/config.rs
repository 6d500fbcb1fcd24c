//! Top-level arguments and process setup.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use corelib::RoutingConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[derive(Debug, Parser)]
#[command(name = "routectl", version, about = "Inspect and exercise client-side RPC routing")]
pub struct CliConfig {
    /// JSON routing configuration; unset fields keep their defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `corelib=trace` (defaults to RUST_LOG, then `info`)
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(&self) -> anyhow::Result<()> {
        init_tracing(self.log.as_deref());
        let routing = self.routing_config()?;
        let result = self.command.execute(&routing)?;
        print!("{result}");
        Ok(())
    }

    pub fn routing_config(&self) -> anyhow::Result<RoutingConfig> {
        let Some(path) = &self.config else {
            return Ok(RoutingConfig::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        RoutingConfig::from_json(&json)
            .with_context(|| format!("invalid config {}", path.display()))
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // a subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
