//! Compiled statement groups.

use super::compiler::{compile, Skeleton};
use super::single::Statement;
use crate::criteria::{Criteria, CriteriaInput, CriteriaSet};
use crate::error::CoreResult;
use crate::procedure::Output;
use crate::types::{ResultShape, Verb};
use quarry_codec::Value;
use quarry_connection::Connection;
use std::sync::Arc;

/// A skeleton plus criteria, compiled into the fewest [`Statement`]s that
/// cover every criterion.
///
/// Criteria are compiled as soon as they are set, so shape errors surface
/// at the call that introduced them rather than at execution.
#[derive(Debug)]
pub struct StatementGroup {
    connection: Arc<dyn Connection>,
    skeleton: Skeleton,
    verb: Verb,
    shape: ResultShape,
    criteria: CriteriaSet,
    statements: Vec<Statement>,
    output: Option<Output>,
    affected: Vec<Value>,
}

impl Clone for StatementGroup {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            skeleton: self.skeleton.clone(),
            verb: self.verb,
            shape: self.shape,
            criteria: CriteriaSet::new(),
            statements: Vec::new(),
            output: None,
            affected: Vec::new(),
        }
    }
}

impl StatementGroup {
    /// Creates a group for `verb` over `skeleton`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSkeleton`](crate::CoreError::InvalidSkeleton)
    /// if the skeleton has unknown markers.
    pub fn new(connection: Arc<dyn Connection>, skeleton: impl Into<String>, verb: Verb) -> CoreResult<Self> {
        Ok(Self {
            connection,
            skeleton: Skeleton::parse(skeleton)?,
            verb,
            shape: verb.default_shape(),
            criteria: CriteriaSet::new(),
            statements: Vec::new(),
            output: None,
            affected: Vec::new(),
        })
    }

    /// Overrides the result shape.
    #[must_use]
    pub fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    /// The verb criteria are compiled for.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The result shape.
    #[must_use]
    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// The skeleton.
    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// The connection every statement runs on.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Criteria currently compiled.
    #[must_use]
    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    /// Compiled statements, one per criteria shape.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    fn compile_set(&self, criteria: &CriteriaSet) -> CoreResult<Vec<Statement>> {
        compile(&self.skeleton, self.verb, criteria)?
            .into_iter()
            .map(|compiled| {
                let mut statement = Statement::new(Arc::clone(&self.connection), compiled.sql, self.verb)
                    .with_shape(self.shape);
                statement.set_params(compiled.params)?;
                Ok(statement)
            })
            .collect()
    }

    /// Replaces the criteria and recompiles.
    ///
    /// A diff contributes only its list for this group's verb.
    ///
    /// # Errors
    ///
    /// Returns the compile error for the first bad criterion; the previous
    /// criteria stay in effect.
    pub fn set_criteria(&mut self, criteria: impl Into<CriteriaInput>) -> CoreResult<()> {
        let criteria = criteria.into().into_set(self.verb);
        self.statements = self.compile_set(&criteria)?;
        self.criteria = criteria;
        Ok(())
    }

    /// Appends criteria and recompiles.
    ///
    /// # Errors
    ///
    /// As for [`set_criteria`](Self::set_criteria).
    pub fn add_criteria(&mut self, criteria: impl Into<CriteriaInput>) -> CoreResult<()> {
        let mut combined = self.criteria.clone();
        combined.extend(criteria.into().into_set(self.verb));
        self.set_criteria(combined)
    }

    /// Executes every compiled statement and combines their results.
    ///
    /// A select group with no criteria runs the skeleton once,
    /// unrestricted. Other verbs with no criteria do nothing.
    ///
    /// # Errors
    ///
    /// Stops at the first failing statement.
    pub fn execute(&mut self) -> CoreResult<()> {
        self.output = None;
        self.affected.clear();

        if self.criteria.is_empty() && self.verb == Verb::Select {
            self.statements = self.compile_set(&Criteria::new().into())?;
        }

        let mut output = None;
        for statement in &mut self.statements {
            statement.execute()?;
            self.affected.extend_from_slice(statement.affected());
            if let Some(produced) = statement.take_output() {
                Output::absorb_all(&mut output, self.shape, produced);
            }
        }
        self.output = output;
        Ok(())
    }

    /// Combined results of the last execution.
    #[must_use]
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Moves the results out.
    pub fn take_output(&mut self) -> Option<Output> {
        self.output.take()
    }

    /// Identifiers reported across every statement of the last execution.
    #[must_use]
    pub fn affected(&self) -> &[Value] {
        &self.affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{equals, AndGroup, Condition, Diff};
    use crate::error::CoreError;
    use quarry_codec::row;
    use quarry_connection::{InMemoryConnection, Outcome};

    fn recorder() -> Arc<InMemoryConnection<()>> {
        InMemoryConnection::new("rec", (), |_, sql, params| {
            let mut row = params.clone();
            row.insert("sql".into(), Value::from(sql));
            Ok(Outcome::rows(vec![row]))
        })
        .shared()
    }

    #[test]
    fn one_statement_per_shape() {
        let conn = recorder();
        let mut group =
            StatementGroup::new(conn.clone(), "SELECT * FROM t WHERE <<condition>>", Verb::Select).unwrap();
        group
            .set_criteria(vec![
                Criteria::with_where(equals([("a", 1)])),
                Criteria::with_where(equals([("a", 2)])),
                Criteria::with_where(AndGroup::new().with("a", Condition::in_list([1, 2, 3]))),
            ])
            .unwrap();

        assert_eq!(group.statements().len(), 2);
        group.execute().unwrap();
        assert_eq!(conn.executed().len(), 3);
        assert_eq!(group.take_output().unwrap().into_single().unwrap().len(), 3);
    }

    #[test]
    fn select_without_criteria_runs_unrestricted() {
        let conn = recorder();
        let mut group =
            StatementGroup::new(conn.clone(), "SELECT * FROM t WHERE <<condition>>", Verb::Select).unwrap();
        group.execute().unwrap();
        assert_eq!(conn.executed()[0].sql, "SELECT * FROM t WHERE 1=1");
    }

    #[test]
    fn dml_without_criteria_is_a_no_op() {
        let conn = recorder();
        let mut group = StatementGroup::new(conn.clone(), "DELETE FROM t WHERE <<condition>>", Verb::Delete).unwrap();
        group.execute().unwrap();
        assert!(conn.executed().is_empty());
    }

    #[test]
    fn diff_contributes_its_verb_list() {
        let mut diff = Diff::new();
        diff.insert.push(Criteria::with_values(row! { "a" => 1 }));
        diff.delete.push(Criteria::with_where(equals([("a", 2)])));

        let mut group = StatementGroup::new(recorder(), "INSERT INTO t <<values>>", Verb::Insert).unwrap();
        group.set_criteria(diff).unwrap();
        assert_eq!(group.criteria().len(), 1);
    }

    #[test]
    fn bad_criteria_keep_previous() {
        let mut group = StatementGroup::new(recorder(), "INSERT INTO t <<values>>", Verb::Insert).unwrap();
        group.set_criteria(Criteria::with_values(row! { "a" => 1 })).unwrap();

        let err = group.set_criteria(Criteria::new()).unwrap_err();
        assert!(matches!(err, CoreError::MissingKey { index: 0, .. }));
        assert_eq!(group.criteria().len(), 1);
    }

    #[test]
    fn add_criteria_recompiles() {
        let mut group = StatementGroup::new(recorder(), "INSERT INTO t <<values>>", Verb::Insert).unwrap();
        group.set_criteria(Criteria::with_values(row! { "a" => 1 })).unwrap();
        group.add_criteria(Criteria::with_values(row! { "a" => 2, "b" => 3 })).unwrap();
        assert_eq!(group.statements().len(), 2);
        assert_eq!(group.statements()[0].param_sets().len(), 1);
    }

    #[test]
    fn clone_is_fresh() {
        let mut group = StatementGroup::new(recorder(), "INSERT INTO t <<values>>", Verb::Insert).unwrap();
        group.set_criteria(Criteria::with_values(row! { "a" => 1 })).unwrap();
        let copy = group.clone();
        assert!(copy.criteria().is_empty());
        assert!(copy.statements().is_empty());
    }
}
