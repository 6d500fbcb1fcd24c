//! Error types for quorum execution.

use corelib::CallError;

/// Result type alias for quorum execution.
pub type Result<T> = std::result::Result<T, QuorumError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum QuorumError {
    /// The quorum for the key was empty: discovery returned nothing or
    /// every node is excluded and none is due a probe.
    #[error("no route: no node available for key")]
    NoRoute,

    /// Every member was tried and failed.
    #[error("all {attempts} quorum members failed, last: {last}")]
    Exhausted {
        attempts: usize,
        /// Cause of the last failure observed.
        #[source]
        last: CallError,
    },
}

impl QuorumError {
    /// The member failure carried by an `Exhausted` error.
    pub fn last_failure(&self) -> Option<&CallError> {
        match self {
            QuorumError::NoRoute => None,
            QuorumError::Exhausted { last, .. } => Some(last),
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, QuorumError::NoRoute)
    }
}
