//! Transaction lifecycle.

use std::fmt;

/// Where a [`Transaction`](super::Transaction) is in its lifecycle.
///
/// ```text
/// Idle -> Began -> Running -> Completed
///                     \-----> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    /// Plan is being built; nothing has run.
    #[default]
    Idle,
    /// Every participant has an open transaction; no step has run.
    Began,
    /// At least one step has run.
    Running,
    /// Committed.
    Completed,
    /// Rolled back after a failure or on request.
    RolledBack,
}

impl TransactionState {
    /// Whether participant transactions are open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, TransactionState::Began | TransactionState::Running)
    }

    /// Whether the transaction has ended either way.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "idle",
            TransactionState::Began => "began",
            TransactionState::Running => "running",
            TransactionState::Completed => "completed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}
