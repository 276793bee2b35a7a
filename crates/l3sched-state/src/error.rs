//! Error types for the scheduler state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
///
/// Storage failures carry the underlying redb/serde message as a string;
/// binding races are not errors and are reported through
/// [`BindOutcome`](crate::BindOutcome) instead.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    /// Another process holds the database file lock.
    #[error("database {0} is already open in another process")]
    AlreadyOpen(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// Identifier cannot be used as (part of) a table key.
    #[error("invalid identifier {0:?}: must be non-empty and contain no ':'")]
    InvalidId(String),
}
