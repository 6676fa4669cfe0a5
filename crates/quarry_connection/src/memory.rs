//! In-memory connection for testing.

use crate::connection::{Connection, Outcome, Params, Prepared};
use crate::error::{ConnectionError, ConnectionResult};
use parking_lot::Mutex;
use quarry_codec::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutable view handed to an [`InMemoryConnection`] handler.
pub struct Session<'a, S> {
    /// The connection's current state.
    pub state: &'a mut S,
    affected: &'a mut Vec<Value>,
}

impl<S> Session<'_, S> {
    /// Records an identifier (e.g. a generated key) for `take_last_affected`.
    pub fn record_affected(&mut self, id: impl Into<Value>) {
        self.affected.push(id.into());
    }
}

/// One statement execution seen by an [`InMemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// The SQL that ran.
    pub sql: String,
    /// The parameters it ran with.
    pub params: Params,
}

type Handler<S> =
    dyn Fn(&mut Session<'_, S>, &str, &Params) -> ConnectionResult<Outcome> + Send + Sync;

struct Inner<S> {
    state: S,
    /// State as of `begin_transaction`, present while a transaction is open.
    begin_snapshot: Option<S>,
    savepoints: Vec<(String, S)>,
    affected: Vec<Value>,
    prepared: HashMap<u64, Arc<str>>,
    next_handle: u64,
    log: Vec<Executed>,
    commits: u64,
    rollbacks: u64,
}

/// A connection whose "database" is an arbitrary cloneable state `S`.
///
/// Every execution is routed to a handler closure that interprets the SQL
/// against the state. Transactions are real: `begin_transaction` and every
/// savepoint snapshot `S`, so rolling back restores exactly the prior state.
///
/// # Thread Safety
///
/// All bookkeeping sits behind one mutex, so the connection can be shared as
/// `Arc<dyn Connection>`. The handler runs while that mutex is held and must
/// not call back into the same connection.
///
/// # Example
///
/// ```rust
/// use quarry_connection::{Connection, InMemoryConnection, Outcome, Params};
///
/// let conn = InMemoryConnection::new("counter", 0u32, |session, _sql, _params| {
///     *session.state += 1;
///     Ok(Outcome::affected(1))
/// });
/// let stmt = conn.prepare("UPDATE counter SET n = n + 1").unwrap();
/// conn.execute(&stmt, &Params::new()).unwrap();
/// assert_eq!(conn.state(), 1);
/// ```
pub struct InMemoryConnection<S> {
    name: String,
    inner: Mutex<Inner<S>>,
    handler: Box<Handler<S>>,
}

impl<S: Clone + Send> InMemoryConnection<S> {
    /// Creates a connection over `state` that executes through `handler`.
    pub fn new<F>(name: impl Into<String>, state: S, handler: F) -> Self
    where
        F: Fn(&mut Session<'_, S>, &str, &Params) -> ConnectionResult<Outcome>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state,
                begin_snapshot: None,
                savepoints: Vec::new(),
                affected: Vec::new(),
                prepared: HashMap::new(),
                next_handle: 1,
                log: Vec::new(),
                commits: 0,
                rollbacks: 0,
            }),
            handler: Box::new(handler),
        }
    }

    /// Wraps the connection for sharing between statements and coordinators.
    #[must_use]
    pub fn shared(self) -> Arc<Self>
    where
        S: 'static,
    {
        Arc::new(self)
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.inner.lock().state.clone()
    }

    /// Replaces the current state outside of any transaction bookkeeping.
    pub fn set_state(&self, state: S) {
        self.inner.lock().state = state;
    }

    /// Every execution so far, oldest first.
    #[must_use]
    pub fn executed(&self) -> Vec<Executed> {
        self.inner.lock().log.clone()
    }

    /// Clears the execution log.
    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// Number of rollbacks (full or to a savepoint).
    #[must_use]
    pub fn rollback_count(&self) -> u64 {
        self.inner.lock().rollbacks
    }
}

impl<S: Clone + Send> Connection for InMemoryConnection<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, sql: &str) -> ConnectionResult<Prepared> {
        if sql.trim().is_empty() {
            return Err(ConnectionError::prepare("empty statement"));
        }
        let mut inner = self.inner.lock();
        let id = inner.next_handle;
        inner.next_handle += 1;
        let sql: Arc<str> = Arc::from(sql);
        inner.prepared.insert(id, Arc::clone(&sql));
        Ok(Prepared::new(id, sql))
    }

    fn execute(&self, statement: &Prepared, params: &Params) -> ConnectionResult<Outcome> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let sql = inner
            .prepared
            .get(&statement.id())
            .cloned()
            .ok_or(ConnectionError::UnknownHandle { id: statement.id() })?;

        tracing::trace!(connection = %self.name, sql = %sql, ?params, "execute");

        let mut session = Session {
            state: &mut inner.state,
            affected: &mut inner.affected,
        };
        let outcome = (self.handler)(&mut session, &sql, params)?;

        inner.log.push(Executed {
            sql: sql.to_string(),
            params: params.clone(),
        });
        Ok(outcome)
    }

    fn begin_transaction(&self) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if inner.begin_snapshot.is_some() {
            return Err(ConnectionError::AlreadyInTransaction);
        }
        inner.begin_snapshot = Some(inner.state.clone());
        Ok(())
    }

    fn set_savepoint(&self, name: &str) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if inner.begin_snapshot.is_none() {
            return Err(ConnectionError::NotInTransaction);
        }
        let snapshot = inner.state.clone();
        inner.savepoints.retain(|(existing, _)| existing != name);
        inner.savepoints.push((name.to_string(), snapshot));
        Ok(())
    }

    fn roll_back(&self, to_savepoint: Option<&str>) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if inner.begin_snapshot.is_none() {
            return Err(ConnectionError::NotInTransaction);
        }

        match to_savepoint {
            Some(name) => {
                let position = inner
                    .savepoints
                    .iter()
                    .rposition(|(existing, _)| existing == name)
                    .ok_or_else(|| ConnectionError::NoSuchSavepoint {
                        name: name.to_string(),
                    })?;
                // Savepoints set after the target are discarded.
                inner.savepoints.truncate(position + 1);
                inner.state = inner.savepoints[position].1.clone();
            }
            None => {
                if let Some(snapshot) = inner.begin_snapshot.take() {
                    inner.state = snapshot;
                }
                inner.savepoints.clear();
            }
        }
        inner.rollbacks += 1;
        Ok(())
    }

    fn commit(&self) -> ConnectionResult<()> {
        let mut inner = self.inner.lock();
        if inner.begin_snapshot.take().is_none() {
            return Err(ConnectionError::NotInTransaction);
        }
        inner.savepoints.clear();
        inner.commits += 1;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.inner.lock().begin_snapshot.is_some()
    }

    fn take_last_affected(&self) -> Vec<Value> {
        std::mem::take(&mut self.inner.lock().affected)
    }
}
