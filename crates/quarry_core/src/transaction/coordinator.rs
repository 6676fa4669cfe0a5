//! Sequencing steps across connections.

use super::state::TransactionState;
use super::step::{Interlude, Interstitial, Iteration, NextStep, Step, StepKind, StepRecord};
use crate::config::Config;
use crate::error::{BoxError, CoreError, CoreResult};
use crate::procedure::{Output, Payload, Procedure};
use crate::statement::Statement;
use crate::types::ResultShape;
use quarry_codec::Value;
use quarry_connection::{same_connection, Connection, ConnectionError};
use std::sync::Arc;

/// An ordered plan of procedures and interstitial logic, run inside one
/// transaction per participant connection.
///
/// # Lifecycle
///
/// Steps and iterations are added while [`Idle`](TransactionState::Idle).
/// [`begin`](Self::begin) opens a transaction on every participant;
/// steps then run one at a time, each isolated by a savepoint (see
/// [`Config::savepoint_name`]). A failed step is rolled back to its
/// savepoint and reported as [`CoreError::StepFailed`] or
/// [`CoreError::UserLogic`].
///
/// # Iterations
///
/// Each [`Iteration`] replays the whole plan with its own payloads. A plan
/// without explicit iterations runs once.
///
/// # Multiple connections
///
/// Commits happen connection by connection, in registration order. They
/// are not atomic across connections.
#[derive(Debug)]
pub struct Transaction {
    config: Config,
    steps: Vec<Step>,
    participants: Vec<Arc<dyn Connection>>,
    base: Option<Arc<dyn Connection>>,
    iterations: Vec<Iteration>,
    records: Vec<Vec<StepRecord>>,
    current: usize,
    cursor: usize,
    state: TransactionState,
    nested_output: Option<Output>,
    nested_affected: Vec<Value>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            steps: self.steps.clone(),
            participants: self.participants.clone(),
            base: self.base.clone(),
            iterations: Vec::new(),
            records: Vec::new(),
            current: 0,
            cursor: 0,
            state: TransactionState::Idle,
            nested_output: None,
            nested_affected: Vec::new(),
        }
    }
}

impl Transaction {
    /// Creates an empty plan with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty plan.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            steps: Vec::new(),
            participants: Vec::new(),
            base: None,
            iterations: Vec::new(),
            records: Vec::new(),
            current: 0,
            cursor: 0,
            state: TransactionState::Idle,
            nested_output: None,
            nested_affected: Vec::new(),
        }
    }

    /// Registers `connection` as a participant, making it the base
    /// connection for SQL-text steps if none is set yet.
    #[must_use]
    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.register(connection);
        self
    }

    fn register(&mut self, connection: Arc<dyn Connection>) {
        if self
            .participants
            .iter()
            .any(|known| same_connection(known, &connection))
        {
            return;
        }
        if self.base.is_none() {
            self.base = Some(Arc::clone(&connection));
        }
        self.participants.push(connection);
    }

    fn push_step(&mut self, name: String, kind: StepKind) -> CoreResult<()> {
        if self.state != TransactionState::Idle {
            return Err(CoreError::invalid_state(format!(
                "cannot add step `{name}` to a {} transaction",
                self.state
            )));
        }
        if self.steps.iter().any(|step| step.name == name) {
            return Err(CoreError::DuplicateStep { name });
        }
        if let StepKind::Procedure(procedure) = &kind {
            for connection in procedure.connections() {
                self.register(connection);
            }
        }
        self.steps.push(Step { name, kind });
        Ok(())
    }

    /// Appends a procedure step.
    ///
    /// # Errors
    ///
    /// Fails unless idle, or if the name is taken.
    pub fn add_procedure(&mut self, name: impl Into<String>, procedure: impl Into<Procedure>) -> CoreResult<()> {
        self.push_step(name.into(), StepKind::Procedure(procedure.into()))
    }

    /// Appends a statement built from `sql` on the base connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoConnection`] if no connection is registered
    /// yet, or fails as [`add_procedure`](Self::add_procedure) does.
    pub fn add_sql(&mut self, name: impl Into<String>, sql: impl Into<String>) -> CoreResult<()> {
        let name = name.into();
        let base = self.base.clone().ok_or_else(|| CoreError::NoConnection {
            message: format!("step `{name}` is SQL text and no connection is registered"),
        })?;
        self.push_step(name, StepKind::Procedure(Statement::infer(base, sql).into()))
    }

    /// Appends caller logic.
    ///
    /// # Errors
    ///
    /// Fails unless idle, or if the name is taken.
    pub fn add_interstitial<F>(&mut self, name: impl Into<String>, logic: F) -> CoreResult<()>
    where
        F: Fn(&mut Interlude<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let logic: Interstitial = Arc::new(logic);
        self.push_step(name.into(), StepKind::Interstitial(logic))
    }

    fn check_iteration(&self, iteration: &Iteration) -> CoreResult<()> {
        for name in iteration.steps() {
            if !self.steps.iter().any(|step| step.name == name) {
                return Err(CoreError::UnknownStep {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Appends one replay of the plan.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownStep`] if the iteration names a step not
    /// in the plan, or [`CoreError::InvalidState`] once finished.
    pub fn add_iteration(&mut self, iteration: Iteration) -> CoreResult<()> {
        if self.state.is_finished() {
            return Err(CoreError::invalid_state(format!(
                "cannot add iterations to a {} transaction",
                self.state
            )));
        }
        self.check_iteration(&iteration)?;
        self.iterations.push(iteration);
        Ok(())
    }

    pub(crate) fn replace_iterations(&mut self, iterations: Vec<Iteration>) -> CoreResult<()> {
        for iteration in &iterations {
            self.check_iteration(iteration)?;
        }
        self.iterations = iterations;
        Ok(())
    }

    /// Participant connections, in registration order.
    #[must_use]
    pub fn participants(&self) -> &[Arc<dyn Connection>] {
        &self.participants
    }

    /// The plan.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index of the iteration that runs next.
    #[must_use]
    pub fn current_iteration(&self) -> usize {
        self.current
    }

    /// Number of iterations; at least one.
    #[must_use]
    pub fn iteration_count(&self) -> usize {
        self.iterations.len().max(1)
    }

    /// Opens a transaction on every participant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] unless idle, or
    /// [`CoreError::TransactionControl`] if a participant refuses; those
    /// already opened are rolled back.
    pub fn begin(&mut self) -> CoreResult<()> {
        if self.state != TransactionState::Idle {
            return Err(CoreError::invalid_state(format!(
                "cannot begin a {} transaction",
                self.state
            )));
        }
        self.open_all()?;
        self.state = TransactionState::Began;
        tracing::debug!(
            participants = self.participants.len(),
            steps = self.steps.len(),
            iterations = self.iteration_count(),
            "transaction began"
        );
        Ok(())
    }

    fn open_all(&self) -> CoreResult<()> {
        for (i, connection) in self.participants.iter().enumerate() {
            if let Err(source) = connection.begin_transaction() {
                for opened in &self.participants[..i] {
                    if let Err(e) = opened.roll_back(None) {
                        tracing::warn!(connection = opened.name(), error = %e, "rollback after failed begin");
                    }
                }
                return Err(CoreError::TransactionControl {
                    connection: connection.name().to_string(),
                    operation: "begin",
                    source,
                });
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(CoreError::invalid_state(format!(
                "transaction is {}, not open",
                self.state
            )))
        }
    }

    /// Runs the next step of the current iteration.
    ///
    /// Returns whether more steps remain in this iteration. A failure rolls
    /// back only the failing step; the transaction stays open.
    ///
    /// # Errors
    ///
    /// [`CoreError::StepFailed`] for a database step,
    /// [`CoreError::UserLogic`] for interstitial logic, or
    /// [`CoreError::InvalidState`] if not open or nothing is left.
    pub fn execute_next_step(&mut self) -> CoreResult<bool> {
        self.ensure_open()?;
        if self.current >= self.iteration_count() {
            return Err(CoreError::invalid_state("every iteration has run"));
        }
        if self.cursor >= self.steps.len() {
            return Err(CoreError::invalid_state("no step left in this iteration"));
        }
        self.run_step(self.config.use_savepoints)?;
        self.state = TransactionState::Running;
        Ok(self.cursor < self.steps.len())
    }

    fn run_step(&mut self, savepoints: bool) -> CoreResult<()> {
        let index = self.cursor;
        let iteration = self.current;
        if self.records.len() <= iteration {
            self.records.resize_with(iteration + 1, Vec::new);
        }
        let name = self.steps[index].name.clone();
        tracing::trace!(step = %name, iteration, "running step");

        let logic = match &self.steps[index].kind {
            StepKind::Interstitial(logic) => Some(Arc::clone(logic)),
            StepKind::Procedure(_) => None,
        };
        let record = match logic {
            Some(logic) => self.run_interstitial(&name, &logic, index, iteration)?,
            None => self.run_procedure(&name, index, iteration, savepoints)?,
        };

        self.records[iteration].push(record);
        self.cursor += 1;
        Ok(())
    }

    fn iteration_mut(&mut self, index: usize) -> &mut Iteration {
        if self.iterations.len() <= index {
            self.iterations.resize_with(index + 1, Iteration::new);
        }
        &mut self.iterations[index]
    }

    fn run_interstitial(
        &mut self,
        name: &str,
        logic: &Interstitial,
        index: usize,
        iteration: usize,
    ) -> CoreResult<StepRecord> {
        let next_name = self.steps.get(index + 1).map(|step| step.name.clone());
        let mut next_payload = match &next_name {
            Some(next) => self.iteration_mut(iteration).take(next),
            None => None,
        };

        let result = {
            let previous = self.records.get(iteration).and_then(|records| records.last());
            let mut interlude = Interlude {
                iteration,
                previous,
                next: next_name.as_deref().map(|next| NextStep {
                    name: next,
                    payload: &mut next_payload,
                }),
            };
            logic(&mut interlude)
        };

        if let (Some(next), Some(payload)) = (next_name, next_payload) {
            self.iteration_mut(iteration).insert(next, payload);
        }

        result.map_err(|source| {
            tracing::warn!(step = name, iteration, error = %source, "interstitial failed");
            CoreError::UserLogic {
                step: name.to_string(),
                iteration,
                source,
            }
        })?;

        Ok(StepRecord {
            name: name.to_string(),
            payload: None,
            output: None,
            affected: Vec::new(),
        })
    }

    fn run_procedure(
        &mut self,
        name: &str,
        index: usize,
        iteration: usize,
        savepoints: bool,
    ) -> CoreResult<StepRecord> {
        let payload = self
            .iterations
            .get(iteration)
            .and_then(|it| it.get(name))
            .cloned();
        let savepoint = savepoints.then(|| self.config.savepoint_name.clone());

        let StepKind::Procedure(procedure) = &mut self.steps[index].kind else {
            return Err(CoreError::invalid_state(format!("step `{name}` is not a procedure")));
        };

        let connections: Vec<Arc<dyn Connection>> = procedure
            .connections()
            .into_iter()
            .filter(|connection| connection.in_transaction())
            .collect();

        if let Some(savepoint) = &savepoint {
            for connection in &connections {
                connection
                    .set_savepoint(savepoint)
                    .map_err(|source| CoreError::TransactionControl {
                        connection: connection.name().to_string(),
                        operation: "savepoint",
                        source,
                    })?;
            }
        }

        if let Err(cause) = apply_and_invoke(procedure, payload.clone()) {
            tracing::warn!(step = name, iteration, error = %cause, "step failed");
            let failure = CoreError::StepFailed {
                step: name.to_string(),
                iteration,
                source: Box::new(cause),
            };

            let mut last: Option<ConnectionError> = None;
            if let Some(savepoint) = &savepoint {
                for connection in &connections {
                    if let Err(e) = connection.roll_back(Some(savepoint)) {
                        tracing::warn!(connection = connection.name(), error = %e, "rollback to savepoint failed");
                        last = Some(e);
                    }
                }
            }
            return Err(match last {
                Some(source) => CoreError::RollbackFailed {
                    cause: Box::new(failure),
                    source,
                },
                None => failure,
            });
        }

        Ok(StepRecord {
            name: name.to_string(),
            payload,
            output: procedure.take_output(),
            affected: procedure.affected(),
        })
    }

    /// Rolls every open participant back, returning the error to surface.
    fn abort(&mut self, cause: CoreError) -> CoreError {
        let mut last = None;
        for connection in &self.participants {
            if !connection.in_transaction() {
                continue;
            }
            if let Err(e) = connection.roll_back(None) {
                tracing::warn!(connection = connection.name(), error = %e, "rollback failed");
                last = Some(e);
            }
        }
        self.state = TransactionState::RolledBack;
        tracing::debug!(error = %cause, "transaction rolled back");

        match last {
            Some(source) => CoreError::RollbackFailed {
                cause: Box::new(cause),
                source,
            },
            None => cause,
        }
    }

    fn commit_all(&mut self) -> CoreResult<()> {
        let failure = self
            .participants
            .iter()
            .filter(|connection| connection.in_transaction())
            .find_map(|connection| {
                connection
                    .commit()
                    .err()
                    .map(|source| CoreError::TransactionControl {
                        connection: connection.name().to_string(),
                        operation: "commit",
                        source,
                    })
            });
        match failure {
            Some(err) => Err(self.abort(err)),
            None => Ok(()),
        }
    }

    /// Runs the remaining steps of the current iteration and moves on to
    /// the next one.
    ///
    /// With `commit`, every participant is committed afterwards and, if
    /// iterations remain, a fresh transaction is opened for them. Begins
    /// automatically when idle. Returns whether iterations remain.
    ///
    /// # Errors
    ///
    /// Any step failure rolls back every participant and ends the
    /// transaction. Rollback failures are logged; the last one is surfaced
    /// as [`CoreError::RollbackFailed`] wrapping the original failure.
    pub fn execute_iteration(&mut self, commit: bool) -> CoreResult<bool> {
        if self.state == TransactionState::Idle {
            self.begin()?;
        }
        self.ensure_open()?;
        if self.current >= self.iteration_count() {
            return Err(CoreError::invalid_state("every iteration has run"));
        }

        while self.cursor < self.steps.len() {
            if let Err(err) = self.run_step(self.config.use_savepoints) {
                return Err(self.abort(err));
            }
            self.state = TransactionState::Running;
        }
        tracing::debug!(iteration = self.current, "iteration complete");

        if commit {
            self.commit_all()?;
        }
        self.current += 1;
        self.cursor = 0;
        let remaining = self.current < self.iteration_count();

        if commit {
            if remaining {
                if let Err(err) = self.open_all() {
                    self.state = TransactionState::RolledBack;
                    return Err(err);
                }
                self.state = TransactionState::Began;
            } else {
                self.state = TransactionState::Completed;
            }
        }
        Ok(remaining)
    }

    /// Runs every remaining iteration and commits once at the end.
    ///
    /// # Errors
    ///
    /// As for [`execute_iteration`](Self::execute_iteration).
    pub fn execute_all(&mut self) -> CoreResult<()> {
        if self.state == TransactionState::Idle {
            self.begin()?;
        }
        while self.current < self.iteration_count() {
            self.execute_iteration(false)?;
        }
        self.commit()
    }

    /// Commits every participant, in registration order.
    ///
    /// # Errors
    ///
    /// A failed commit rolls back the participants not yet committed and
    /// returns [`CoreError::TransactionControl`].
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.commit_all()?;
        self.state = TransactionState::Completed;
        tracing::debug!(participants = self.participants.len(), "transaction committed");
        Ok(())
    }

    /// Rolls every participant back.
    ///
    /// # Errors
    ///
    /// Every participant is attempted; the last failure is returned as
    /// [`CoreError::TransactionControl`].
    pub fn roll_back(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let mut last = None;
        for connection in &self.participants {
            if !connection.in_transaction() {
                continue;
            }
            if let Err(e) = connection.roll_back(None) {
                tracing::warn!(connection = connection.name(), error = %e, "rollback failed");
                last = Some((connection.name().to_string(), e));
            }
        }
        self.state = TransactionState::RolledBack;
        match last {
            Some((connection, source)) => Err(CoreError::TransactionControl {
                connection,
                operation: "rollback",
                source,
            }),
            None => Ok(()),
        }
    }

    /// Records of an iteration's executed steps; the latest iteration by
    /// default.
    #[must_use]
    pub fn step_results(&self, iteration: Option<usize>) -> Option<&[StepRecord]> {
        match iteration {
            Some(index) => self.records.get(index),
            None => self.records.last(),
        }
        .map(Vec::as_slice)
    }

    /// The record for step `name`; the latest iteration by default.
    #[must_use]
    pub fn step_result(&self, name: &str, iteration: Option<usize>) -> Option<&StepRecord> {
        self.step_results(iteration)?
            .iter()
            .find(|record| record.name == name)
    }

    /// Runs every iteration without opening, committing, or setting
    /// savepoints; the enclosing transaction owns those.
    pub(crate) fn run_nested(&mut self) -> CoreResult<()> {
        self.records.clear();
        self.current = 0;
        self.cursor = 0;
        self.nested_output = None;
        self.nested_affected.clear();

        while self.current < self.iteration_count() {
            while self.cursor < self.steps.len() {
                self.run_step(false)?;
            }
            self.current += 1;
            self.cursor = 0;
        }

        let mut output = None;
        for record in self.records.iter().flatten() {
            if let Some(produced) = &record.output {
                Output::absorb_all(&mut output, ResultShape::PerCall, produced.clone());
            }
            self.nested_affected.extend(record.affected.iter().cloned());
        }
        self.nested_output = output;
        Ok(())
    }

    pub(crate) fn nested_output(&self) -> Option<&Output> {
        self.nested_output.as_ref()
    }

    pub(crate) fn take_nested_output(&mut self) -> Option<Output> {
        self.nested_output.take()
    }

    pub(crate) fn nested_affected(&self) -> Vec<Value> {
        self.nested_affected.clone()
    }
}

fn apply_and_invoke(procedure: &mut Procedure, payload: Option<Payload>) -> CoreResult<()> {
    if let Some(payload) = payload {
        procedure.set_payload(payload)?;
    }
    procedure.invoke()
}
