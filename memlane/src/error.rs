//! Error types for memlane.

use std::fmt;

/// Error type for RMA operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Lane has no resources to accept the operation right now.
    ///
    /// Transient: the engine retries the identical fragment on the next
    /// progress pass. Callers only see this from lane implementations,
    /// never from the public PUT/GET entry points.
    NoResource,
    /// Invalid parameter passed to an operation.
    InvalidParam(&'static str),
    /// Request pool is exhausted.
    PoolExhausted,
    /// Memory registration with the lane failed.
    RegistrationFailed(String),
    /// No lane at the given index.
    NoLane(usize),
    /// Transport-level failure reported by a lane.
    Transport(String),
}

impl Error {
    /// Whether this error denotes transient backpressure rather than a
    /// terminal failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NoResource)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoResource => write!(f, "No resources available on lane"),
            Error::InvalidParam(what) => write!(f, "Invalid parameter: {}", what),
            Error::PoolExhausted => write!(f, "Request pool is exhausted"),
            Error::RegistrationFailed(msg) => write!(f, "Memory registration failed: {}", msg),
            Error::NoLane(idx) => write!(f, "No lane at index {}", idx),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for RMA operations.
pub type Result<T> = std::result::Result<T, Error>;
