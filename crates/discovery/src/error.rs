//! Error types for discovery integration.

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The feed knows nothing about the requested service.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// A client for a discovered node could not be built.
    #[error("failed to create client for {node}: {reason}")]
    ClientCreation { node: String, reason: String },

    /// Rebuilding the routing structures failed.
    #[error(transparent)]
    Routing(#[from] corelib::Error),
}
