//! Error handling for the camtrail engine

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate or busy resource)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not legal in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Topology error (unresolvable camera, broken edge)
    #[error("Topology error: {0}")]
    Topology(String),

    /// External capability failure (analyzer, store, sink)
    #[error("Capability error: {0}")]
    Capability(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
