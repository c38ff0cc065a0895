//! Error taxonomy shared by the mailbox, request manager, and handler layers.

use thiserror::Error;

/// Errors that can occur anywhere in the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request's `address` field was empty or otherwise malformed.
    #[error("invalid address")]
    InvalidAddress,

    /// The verifier rejected the request's additional authenticated data.
    #[error("failed AAD verification")]
    FailedAadVerification,

    /// A configured `Provider` has no matching implementation.
    #[error("unknown backend provider: {0}")]
    UnknownBackend(String),

    /// The selected `Provider` doesn't match the nested config block supplied.
    #[error("backend config conflict: {0}")]
    BackendConfigConflict(String),

    /// The mailbox backing store is unreachable or has exhausted its retry budget.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// `Insert` was called with an id outside `[offset, next)`.
    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    /// `Insert` was called with an id that already has an event.
    #[error("event already present at id {0}")]
    AlreadyPresent(u64),

    /// An invariant that should be unreachable under any valid input was violated.
    ///
    /// Call sites that raise this should be treated as a process-ending bug,
    /// not a recoverable error.
    #[error("internal programmer error: {0}")]
    InternalProgrammerError(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error not covered by `BackendConfigConflict`.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias used throughout the broker.
pub type Result<T> = std::result::Result<T, BrokerError>;
