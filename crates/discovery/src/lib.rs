//! Discovery integration for the routing core.
//!
//! A discovery feed publishes the current (id, address, tags) list of a
//! logical service. [`ServiceRouter`] turns each list into node handles,
//! reusing the ones that did not change, and republishes its weighted
//! balancer and both key rings. [`Maintenance`] runs the periodic circuit
//! breaker evaluation on a tokio interval.

pub mod error;
pub mod feed;
pub mod maintenance;
pub mod router;

pub use error::{DiscoveryError, Result};
pub use feed::{ClientFactory, DiscoveredNode, Discovery, DiscoveryListener, StaticDiscovery};
pub use maintenance::Maintenance;
pub use router::{RouterUpdate, ServiceRouter};
