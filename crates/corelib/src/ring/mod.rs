//! Consistent hash ring implementation.
//!
//! The ring maps keys to an ordered, duplicate-free quorum of nodes using
//! virtual-node replication.

pub mod ring;

pub use ring::{HashRing, RingBuilder, DEFAULT_QUORUM, DEFAULT_VNODES};
