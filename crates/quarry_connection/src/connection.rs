//! Connection capability trait definition.

use crate::error::ConnectionResult;
use indexmap::IndexMap;
use quarry_codec::{Row, Value};
use std::fmt;
use std::sync::Arc;

/// Named parameters bound to one execution of a prepared statement.
///
/// Keys are placeholder names without the leading `:`.
pub type Params = IndexMap<String, Value>;

/// A statement prepared on a specific connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    id: u64,
    sql: Arc<str>,
}

impl Prepared {
    /// Creates a handle. Only connection implementations should call this.
    pub fn new(id: u64, sql: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            sql: sql.into(),
        }
    }

    /// Connection-assigned handle id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The SQL text that was prepared.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// What a single execution produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Rows returned, if the statement produces a row set.
    pub rows: Option<Vec<Row>>,
    /// Number of rows changed by a data-modifying statement.
    pub affected_rows: u64,
}

impl Outcome {
    /// An outcome carrying a row set.
    #[must_use]
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Some(rows),
            affected_rows: 0,
        }
    }

    /// An outcome for a data-modifying statement.
    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self {
            rows: None,
            affected_rows: count,
        }
    }
}

/// A database connection as seen by the engine.
///
/// Connections are **opaque capabilities**: the engine never looks at which
/// database backs them. It prepares SQL, executes it with named parameters,
/// and drives transaction boundaries.
///
/// # Invariants
///
/// - A handle from `prepare` is only valid on the connection that issued it
/// - `take_last_affected` drains: a second call returns nothing new
/// - `roll_back(Some(name))` keeps the transaction open; `roll_back(None)`
///   ends it
/// - Connections are shared as `Arc<dyn Connection>`, so every method takes
///   `&self` and implementations synchronize internally
pub trait Connection: Send + Sync {
    /// Human-readable identity used in error context.
    fn name(&self) -> &str;

    /// Prepares `sql` for execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the SQL.
    fn prepare(&self, sql: &str) -> ConnectionResult<Prepared>;

    /// Executes a prepared statement with bound parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or the driver fails.
    fn execute(&self, statement: &Prepared, params: &Params) -> ConnectionResult<Outcome>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    fn begin_transaction(&self) -> ConnectionResult<()>;

    /// Sets (or replaces) a named savepoint inside the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn set_savepoint(&self, name: &str) -> ConnectionResult<()>;

    /// Rolls back to a savepoint, or the whole transaction when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the savepoint is unknown.
    fn roll_back(&self, to_savepoint: Option<&str>) -> ConnectionResult<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the commit fails.
    fn commit(&self) -> ConnectionResult<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Identifiers (e.g. generated keys) recorded since the last call.
    fn take_last_affected(&self) -> Vec<Value>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Identity comparison for shared connections.
///
/// Two handles are the same participant exactly when they point at the same
/// allocation.
#[must_use]
pub fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
