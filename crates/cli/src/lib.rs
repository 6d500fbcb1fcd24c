//! `routectl`: inspect and exercise the routing core from the command line.
//!
//! Provides commands for:
//! - Printing ring layouts, quorums and token ownership
//! - Sampling the weighted balancer
//! - Simulating node failures against the async quorum executor

pub mod commands;
pub mod config;
pub mod simulate;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
