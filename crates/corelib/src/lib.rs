//! Core library for client-side RPC routing.
//!
//! This crate provides the routing algorithms:
//! - Node handles and the weight normalizer
//! - Weighted-random balancer with atomic snapshot swaps
//! - Partitioners, tokens and virtual nodes
//! - Consistent hash ring with bounded quorum lookup
//! - Per-node health tracking and circuit breaking
//! - Dual-ring key balancer combining the two
//! - Routing configuration

pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod key_balancer;
pub mod node;
pub mod partitioner;
pub mod ring;
pub mod token;
pub mod vnode;
pub mod weight;

pub use balancer::{Balancer, BalancerKind, Weigher};
pub use config::RoutingConfig;
pub use error::{CallError, Error, Result};
pub use health::{HealthRegistry, HealthState, NodeHealth, Transition};
pub use key_balancer::KeyBalancer;
pub use node::{Node, NodeHandle, NodeId, SharedHandle};
pub use partitioner::Partitioner;
pub use ring::{HashRing, RingBuilder};
pub use token::HashToken;
pub use vnode::VirtualNode;
