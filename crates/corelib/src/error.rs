//! Error types for the core library.

use std::time::Duration;

use crate::node::NodeId;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building routing structures.
///
/// All of these are construction-time failures; nothing on the lookup path
/// returns an `Error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid routing configuration (zero quorum, bad threshold, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid node description.
    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// The same node id was supplied twice to one ring.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failure of a single call against a single node.
///
/// This is what a transport reports back to the routing layer; it is fed into
/// the node's health record and, when every quorum member fails, surfaced to
/// the caller as the cause of the overall failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// No usable connection within the configured maximum wait.
    #[error("no connection after {waited:?}")]
    Timeout {
        /// How long the member waited.
        waited: Duration,
    },

    /// Connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Transport-level failure after connecting.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote side answered with an application error.
    #[error("{kind}: {message}")]
    Application {
        /// Error class, matched against the ignore list.
        kind: String,
        /// Human-readable message.
        message: String,
    },
}

impl CallError {
    /// Shorthand for an application error.
    pub fn application(kind: impl Into<String>, message: impl Into<String>) -> Self {
        CallError::Application {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// True for failures that mean the node could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CallError::Timeout { .. } | CallError::Connect(_))
    }

    /// The application error class, if this is an application error.
    pub fn kind(&self) -> Option<&str> {
        match self {
            CallError::Application { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_classification() {
        assert!(CallError::Connect("refused".into()).is_connectivity());
        assert!(CallError::Timeout {
            waited: Duration::from_millis(5)
        }
        .is_connectivity());
        assert!(!CallError::Transport("reset".into()).is_connectivity());

        let app = CallError::application("NotFound", "no such row");
        assert_eq!(app.kind(), Some("NotFound"));
        assert_eq!(app.to_string(), "NotFound: no such row");
    }
}
