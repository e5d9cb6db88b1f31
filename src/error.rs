//! Error types for the control plane

use thiserror::Error;

/// Result type for control-plane operations
pub type HypervisorResult<T> = Result<T, HypervisorError>;

/// Error kinds surfaced by the scheduler and its collaborators
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// A queue store call failed; the scheduling pass aborts and nothing
    /// is flushed to the relational store
    #[error("Queue store unavailable: {0}")]
    QueueStoreUnavailable(String),

    /// Relational store failure
    #[error("Store error: {0}")]
    Store(String),

    /// A queue key failed to parse, or an accounting precondition was broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Entity absent
    #[error("{0} not found")]
    NotFound(String),

    /// Unique-constraint violation (username, organization name, priority)
    #[error("{0}")]
    Conflict(String),

    /// A resource demand exceeds the cluster's total capacity
    #[error("{0}")]
    CapacityExceeded(String),

    /// Missing identifier or malformed input
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or bearer token
    #[error("{0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for HypervisorError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                HypervisorError::Conflict(db.message().to_string())
            }
            _ => HypervisorError::Store(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for HypervisorError {
    fn from(err: redis::RedisError) -> Self {
        HypervisorError::QueueStoreUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for HypervisorError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        HypervisorError::Unauthorized("Could not validate credentials".to_string())
    }
}
