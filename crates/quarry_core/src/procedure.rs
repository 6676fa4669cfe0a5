//! The uniform procedure capability shared by statements, statement groups,
//! and nested transactions.

use crate::criteria::{Criteria, CriteriaInput, CriteriaSet, Diff};
use crate::error::{CoreError, CoreResult};
use crate::result_set::ResultSet;
use crate::statement::{Statement, StatementGroup};
use crate::transaction::{Iteration, Transaction};
use crate::types::{ResultShape, Verb};
use quarry_codec::Value;
use quarry_connection::{Connection, Params};
use std::sync::Arc;

/// What a procedure produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Executions merged into one result set.
    Single(ResultSet),
    /// One result set per execution.
    PerCall(Vec<ResultSet>),
}

impl Output {
    /// Folds `set` into `slot` according to `shape`.
    pub(crate) fn absorb(slot: &mut Option<Output>, shape: ResultShape, set: ResultSet) {
        match shape {
            ResultShape::None => {}
            ResultShape::PerCall => match slot {
                Some(Output::PerCall(sets)) => sets.push(set),
                Some(Output::Single(existing)) => {
                    let first = std::mem::take(existing);
                    *slot = Some(Output::PerCall(vec![first, set]));
                }
                None => *slot = Some(Output::PerCall(vec![set])),
            },
            ResultShape::Union | ResultShape::UnionAll => {
                let dedupe = shape == ResultShape::Union;
                match slot {
                    Some(Output::Single(existing)) => existing.merge(set, dedupe),
                    Some(Output::PerCall(sets)) => {
                        let mut merged = ResultSet::new();
                        for earlier in std::mem::take(sets) {
                            merged.merge(earlier, dedupe);
                        }
                        merged.merge(set, dedupe);
                        *slot = Some(Output::Single(merged));
                    }
                    None => {
                        let mut merged = ResultSet::new();
                        merged.merge(set, dedupe);
                        *slot = Some(Output::Single(merged));
                    }
                }
            }
        }
    }

    /// Folds every result set of `output` into `slot`.
    pub(crate) fn absorb_all(slot: &mut Option<Output>, shape: ResultShape, output: Output) {
        for set in output.into_result_sets() {
            Self::absorb(slot, shape, set);
        }
    }

    /// Borrows every result set, in order.
    #[must_use]
    pub fn result_sets(&self) -> Vec<&ResultSet> {
        match self {
            Output::Single(set) => vec![set],
            Output::PerCall(sets) => sets.iter().collect(),
        }
    }

    /// Consumes the output, returning every result set in order.
    #[must_use]
    pub fn into_result_sets(self) -> Vec<ResultSet> {
        match self {
            Output::Single(set) => vec![set],
            Output::PerCall(sets) => sets,
        }
    }

    /// Demands exactly one result set. No result sets yields an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MultipleResultSets`] when there are several.
    pub fn into_single(self) -> CoreResult<ResultSet> {
        match self {
            Output::Single(set) => Ok(set),
            Output::PerCall(mut sets) => match sets.len() {
                0 => Ok(ResultSet::new()),
                1 => Ok(sets.remove(0)),
                count => Err(CoreError::MultipleResultSets { count }),
            },
        }
    }
}

/// Input handed to a procedure before it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parameter sets for a plain [`Statement`].
    Params(Vec<Params>),
    /// Criteria for a [`StatementGroup`].
    Criteria(CriteriaInput),
    /// Named step payloads for a nested [`Transaction`].
    Iteration(Iteration),
}

impl From<Vec<Params>> for Payload {
    fn from(params: Vec<Params>) -> Self {
        Payload::Params(params)
    }
}

impl From<Params> for Payload {
    fn from(params: Params) -> Self {
        Payload::Params(vec![params])
    }
}

impl From<CriteriaInput> for Payload {
    fn from(criteria: CriteriaInput) -> Self {
        Payload::Criteria(criteria)
    }
}

impl From<CriteriaSet> for Payload {
    fn from(criteria: CriteriaSet) -> Self {
        Payload::Criteria(criteria.into())
    }
}

impl From<Criteria> for Payload {
    fn from(criteria: Criteria) -> Self {
        Payload::Criteria(criteria.into())
    }
}

impl From<Diff> for Payload {
    fn from(diff: Diff) -> Self {
        Payload::Criteria(diff.into())
    }
}

impl From<Iteration> for Payload {
    fn from(iteration: Iteration) -> Self {
        Payload::Iteration(iteration)
    }
}

/// Anything the coordinator or a model can run.
///
/// Cloning yields a fresh procedure: parameters, criteria, iterations, and
/// results are not carried over.
#[derive(Debug, Clone)]
pub enum Procedure {
    /// A plain statement.
    Statement(Statement),
    /// A compiled statement group.
    Group(StatementGroup),
    /// A nested transaction, run without its own begin/commit.
    Transaction(Box<Transaction>),
}

impl Procedure {
    /// The verb, for statements and groups.
    #[must_use]
    pub fn verb(&self) -> Option<Verb> {
        match self {
            Procedure::Statement(statement) => Some(statement.verb()),
            Procedure::Group(group) => Some(group.verb()),
            Procedure::Transaction(_) => None,
        }
    }

    /// Every connection this procedure touches.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        match self {
            Procedure::Statement(statement) => vec![Arc::clone(statement.connection())],
            Procedure::Group(group) => vec![Arc::clone(group.connection())],
            Procedure::Transaction(transaction) => transaction.participants().to_vec(),
        }
    }

    /// Applies `payload`.
    ///
    /// A statement accepts parameter sets, or criteria whose `values`
    /// become parameter sets. A group accepts criteria. A nested
    /// transaction accepts one iteration, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PayloadMismatch`] for any other combination, or
    /// the error from applying it.
    pub fn set_payload(&mut self, payload: Payload) -> CoreResult<()> {
        match (self, payload) {
            (Procedure::Statement(statement), Payload::Params(params)) => statement.set_params(params),
            (Procedure::Statement(statement), Payload::Criteria(criteria)) => {
                let params = criteria
                    .into_set(statement.verb())
                    .into_iter()
                    .map(Criteria::into_values)
                    .collect();
                statement.set_params(params)
            }
            (Procedure::Group(group), Payload::Criteria(criteria)) => group.set_criteria(criteria),
            (Procedure::Transaction(transaction), Payload::Iteration(iteration)) => {
                transaction.replace_iterations(vec![iteration])
            }
            (procedure, payload) => Err(CoreError::payload_mismatch(format!(
                "{} cannot take {}",
                procedure.kind(),
                match payload {
                    Payload::Params(_) => "parameter sets",
                    Payload::Criteria(_) => "criteria",
                    Payload::Iteration(_) => "an iteration",
                }
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Procedure::Statement(_) => "a statement",
            Procedure::Group(_) => "a statement group",
            Procedure::Transaction(_) => "a nested transaction",
        }
    }

    /// Runs the procedure.
    ///
    /// # Errors
    ///
    /// Propagates the underlying failure.
    pub fn invoke(&mut self) -> CoreResult<()> {
        match self {
            Procedure::Statement(statement) => statement.execute(),
            Procedure::Group(group) => group.execute(),
            Procedure::Transaction(transaction) => transaction.run_nested(),
        }
    }

    /// Results of the last invocation.
    #[must_use]
    pub fn output(&self) -> Option<&Output> {
        match self {
            Procedure::Statement(statement) => statement.output(),
            Procedure::Group(group) => group.output(),
            Procedure::Transaction(transaction) => transaction.nested_output(),
        }
    }

    /// Moves the results out.
    pub fn take_output(&mut self) -> Option<Output> {
        match self {
            Procedure::Statement(statement) => statement.take_output(),
            Procedure::Group(group) => group.take_output(),
            Procedure::Transaction(transaction) => transaction.take_nested_output(),
        }
    }

    /// Identifiers reported during the last invocation.
    #[must_use]
    pub fn affected(&self) -> Vec<Value> {
        match self {
            Procedure::Statement(statement) => statement.affected().to_vec(),
            Procedure::Group(group) => group.affected().to_vec(),
            Procedure::Transaction(transaction) => transaction.nested_affected(),
        }
    }
}

impl From<Statement> for Procedure {
    fn from(statement: Statement) -> Self {
        Procedure::Statement(statement)
    }
}

impl From<StatementGroup> for Procedure {
    fn from(group: StatementGroup) -> Self {
        Procedure::Group(group)
    }
}

impl From<Transaction> for Procedure {
    fn from(transaction: Transaction) -> Self {
        Procedure::Transaction(Box::new(transaction))
    }
}
