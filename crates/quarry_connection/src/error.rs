//! Error types for connection operations.

use thiserror::Error;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised by a connection while preparing, executing, or managing
/// transactions.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The driver rejected or failed a statement.
    #[error("driver error: {message}")]
    Driver {
        /// Driver-supplied description.
        message: String,
    },

    /// The statement could not be prepared.
    #[error("prepare failed: {message}")]
    Prepare {
        /// Driver-supplied description.
        message: String,
    },

    /// A prepared handle that this connection never issued.
    #[error("unknown prepared statement handle {id}")]
    UnknownHandle {
        /// The handle id.
        id: u64,
    },

    /// A transaction operation was issued outside a transaction.
    #[error("no transaction is active")]
    NotInTransaction,

    /// `begin_transaction` was called while a transaction is open.
    #[error("a transaction is already active")]
    AlreadyInTransaction,

    /// Rollback targeted a savepoint that does not exist.
    #[error("no such savepoint: {name}")]
    NoSuchSavepoint {
        /// The savepoint name.
        name: String,
    },
}

impl ConnectionError {
    /// Creates a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Creates a prepare error.
    pub fn prepare(message: impl Into<String>) -> Self {
        Self::Prepare {
            message: message.into(),
        }
    }
}
