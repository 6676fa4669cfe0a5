//! A single SQL statement bound to a connection.

use super::placeholders;
use crate::error::{CoreError, CoreResult};
use crate::procedure::Output;
use crate::result_set::ResultSet;
use crate::types::{ResultShape, Verb};
use indexmap::IndexSet;
use quarry_codec::Value;
use quarry_connection::{Connection, ConnectionError, Params, Prepared};
use std::sync::Arc;

/// SQL text, its connection, and the parameter sets to run it with.
///
/// The placeholder set is discovered once at construction and never
/// changes; only parameter values vary between executions.
///
/// Cloning keeps the SQL, connection, and prepared handle but drops
/// parameter sets and captured results.
#[derive(Debug)]
pub struct Statement {
    connection: Arc<dyn Connection>,
    sql: String,
    verb: Verb,
    shape: ResultShape,
    placeholders: IndexSet<String>,
    param_sets: Vec<Params>,
    prepared: Option<Prepared>,
    output: Option<Output>,
    affected: Vec<Value>,
}

impl Clone for Statement {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            sql: self.sql.clone(),
            verb: self.verb,
            shape: self.shape,
            placeholders: self.placeholders.clone(),
            param_sets: Vec::new(),
            prepared: self.prepared.clone(),
            output: None,
            affected: Vec::new(),
        }
    }
}

impl Statement {
    /// Creates a statement with the verb's default result shape.
    pub fn new(connection: Arc<dyn Connection>, sql: impl Into<String>, verb: Verb) -> Self {
        let sql = sql.into();
        Self {
            connection,
            placeholders: placeholders::scan(&sql),
            sql,
            verb,
            shape: verb.default_shape(),
            param_sets: Vec::new(),
            prepared: None,
            output: None,
            affected: Vec::new(),
        }
    }

    /// Creates a statement, guessing the verb from the SQL.
    pub fn infer(connection: Arc<dyn Connection>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let verb = Verb::infer(&sql);
        Self::new(connection, sql, verb)
    }

    /// Overrides the result shape.
    #[must_use]
    pub fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The declared verb.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// How results of repeated executions are combined.
    #[must_use]
    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Placeholder names, in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> &IndexSet<String> {
        &self.placeholders
    }

    /// The connection this statement runs on.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Parameter sets queued for the next execution.
    #[must_use]
    pub fn param_sets(&self) -> &[Params] {
        &self.param_sets
    }

    fn project(&self, params: Params) -> CoreResult<Params> {
        let mut missing = Vec::new();
        let mut projected = Params::with_capacity(self.placeholders.len());
        for name in &self.placeholders {
            match params.get(name) {
                Some(value) => {
                    projected.insert(name.clone(), value.clone());
                }
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(projected)
        } else {
            Err(CoreError::ParameterMismatch { missing })
        }
    }

    /// Replaces the queued parameter sets.
    ///
    /// Each set is projected onto the placeholders: extra keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParameterMismatch`] if a set lacks a
    /// placeholder; the previous sets are kept in that case.
    pub fn set_params(&mut self, sets: Vec<Params>) -> CoreResult<()> {
        let projected = sets
            .into_iter()
            .map(|set| self.project(set))
            .collect::<CoreResult<Vec<_>>>()?;
        self.param_sets = projected;
        Ok(())
    }

    /// Queues one more parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParameterMismatch`] if it lacks a placeholder.
    pub fn add_params(&mut self, set: Params) -> CoreResult<()> {
        let projected = self.project(set)?;
        self.param_sets.push(projected);
        Ok(())
    }

    /// Drops queued parameter sets.
    pub fn clear_params(&mut self) {
        self.param_sets.clear();
    }

    fn execution_error(&self, source: ConnectionError) -> CoreError {
        CoreError::Execution {
            connection: self.connection.name().to_string(),
            sql: self.sql.clone(),
            source,
        }
    }

    /// Runs the statement once per queued parameter set.
    ///
    /// A statement without placeholders runs once even with nothing
    /// queued. Results replace those of any earlier execution.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParameterMismatch`] if placeholders exist but
    /// nothing is queued, or [`CoreError::Execution`] wrapping the driver
    /// failure.
    pub fn execute(&mut self) -> CoreResult<()> {
        self.output = None;
        self.affected.clear();

        let runs: Vec<Params> = if self.param_sets.is_empty() {
            if !self.placeholders.is_empty() {
                return Err(CoreError::ParameterMismatch {
                    missing: self.placeholders.iter().cloned().collect(),
                });
            }
            vec![Params::new()]
        } else {
            self.param_sets.clone()
        };

        let prepared = match &self.prepared {
            Some(prepared) => prepared.clone(),
            None => {
                let prepared = self
                    .connection
                    .prepare(&self.sql)
                    .map_err(|e| self.execution_error(e))?;
                self.prepared = Some(prepared.clone());
                prepared
            }
        };

        tracing::debug!(
            connection = self.connection.name(),
            verb = %self.verb,
            runs = runs.len(),
            sql = %self.sql,
            "executing statement"
        );

        let mut output = None;
        for params in &runs {
            let outcome = self
                .connection
                .execute(&prepared, params)
                .map_err(|e| self.execution_error(e))?;
            let affected = self.connection.take_last_affected();

            let mut set = ResultSet::from_rows(outcome.rows.unwrap_or_default());
            set.extend_affected(affected.iter().cloned());
            self.affected.extend(affected);
            Output::absorb(&mut output, self.shape, set);
        }
        self.output = output;
        Ok(())
    }

    /// Results of the last execution; `None` for [`ResultShape::None`] or
    /// before any execution.
    #[must_use]
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Moves the results out.
    pub fn take_output(&mut self) -> Option<Output> {
        self.output.take()
    }

    /// Identifiers the connection reported during the last execution.
    #[must_use]
    pub fn affected(&self) -> &[Value] {
        &self.affected
    }
}
