//! Connection traits implemented by node clients.
//!
//! The routing layer never looks at wire bytes. A node's client only has to
//! hand out a connection; the caller's operation does the actual invoke.

use std::time::Duration;

use async_trait::async_trait;
use corelib::CallError;

/// Client side of a node reachable from async code.
///
/// The executor bounds `connect` with the configured maximum wait, so
/// implementations need not time out on their own.
#[async_trait]
pub trait AsyncConnect: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, CallError>;
}

/// Client side of a node reachable from blocking code.
pub trait BlockingConnect: Send + Sync {
    type Connection;

    /// Get a usable connection, waiting at most `max_wait`.
    ///
    /// Implementations should honor `max_wait`; the executor also treats a
    /// connection that arrives late as a timeout.
    fn connect(&self, max_wait: Duration) -> Result<Self::Connection, CallError>;
}
