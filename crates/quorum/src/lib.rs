//! Quorum client executors.
//!
//! This crate turns a routing decision (the quorum for a key) into a call:
//!
//! - [`AsyncQuorumExecutor`] sends the call to every member concurrently on
//!   tokio and resolves with the first success
//! - [`SyncQuorumExecutor`] tries members one after another on the caller's
//!   thread
//!
//! Both record every outcome in the node's health and report it through the
//! explicit [`CallContext`] handed to them.

pub mod async_exec;
pub mod context;
pub mod error;
pub mod plan;
pub mod sync_exec;
pub mod transport;

pub use async_exec::AsyncQuorumExecutor;
pub use context::{CallContext, CallReporter, MemberOutcome, TraceContext, TracingReporter};
pub use error::{QuorumError, Result};
pub use plan::{Member, QuorumPlan};
pub use sync_exec::SyncQuorumExecutor;
pub use transport::{AsyncConnect, BlockingConnect};
