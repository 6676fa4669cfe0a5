//! Where clauses, criteria, and criteria sets.

use super::condition::Condition;
use super::diff::Diff;
use crate::types::Verb;
use indexmap::IndexMap;
use quarry_codec::{Row, Value};

/// Conditions that must all hold. Several conditions on one column are
/// ANDed as well.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndGroup {
    columns: IndexMap<String, Vec<Condition>>,
}

impl AndGroup {
    /// Creates an empty group (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition on `column`, builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.push(column, condition);
        self
    }

    /// Adds a condition on `column`.
    pub fn push(&mut self, column: impl Into<String>, condition: Condition) {
        self.columns.entry(column.into()).or_default().push(condition);
    }

    /// Iterates `(column, conditions)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Condition])> {
        self.columns
            .iter()
            .map(|(column, conditions)| (column.as_str(), conditions.as_slice()))
    }

    /// Columns this group constrains.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of constrained columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the group has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Equality on every column of `row`; `NULL` cells become `IS NULL`.
    #[must_use]
    pub fn matching_row(row: &Row) -> Self {
        let mut group = Self::new();
        for (column, value) in row {
            let condition = if value.is_null() {
                Condition::is_null()
            } else {
                Condition::eq(value.clone())
            };
            group.push(column.clone(), condition);
        }
        group
    }
}

/// AND-groups ORed together. No groups means "no restriction".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    groups: Vec<AndGroup>,
}

impl WhereClause {
    /// An unrestricted clause.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A clause of one AND-group.
    #[must_use]
    pub fn single(group: AndGroup) -> Self {
        Self {
            groups: vec![group],
        }
    }

    /// Adds an alternative, builder style.
    #[must_use]
    pub fn or(mut self, group: AndGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Adds an alternative.
    pub fn push(&mut self, group: AndGroup) {
        self.groups.push(group);
    }

    /// The AND-groups, in order.
    #[must_use]
    pub fn groups(&self) -> &[AndGroup] {
        &self.groups
    }

    /// Whether the clause places no restriction. Empty groups count as none.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(AndGroup::is_empty)
    }

    /// Every column referenced by any group.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().flat_map(AndGroup::columns)
    }
}

impl From<AndGroup> for WhereClause {
    fn from(group: AndGroup) -> Self {
        Self::single(group)
    }
}

impl FromIterator<AndGroup> for WhereClause {
    fn from_iter<I: IntoIterator<Item = AndGroup>>(iter: I) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}

/// One CRUD intent: optional `values` plus a where clause.
///
/// Which parts are required depends on the verb it is compiled for:
///
/// | verb   | `values`            | `where`         |
/// |--------|---------------------|-----------------|
/// | select | projection, optional | optional       |
/// | insert | required            | must be empty   |
/// | update | required            | optional        |
/// | delete | must be absent      | optional        |
/// | call   | optional            | optional        |
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    values: Option<Row>,
    conditions: WhereClause,
}

impl Criteria {
    /// An empty criterion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A criterion carrying only values.
    #[must_use]
    pub fn with_values(values: Row) -> Self {
        Self {
            values: Some(values),
            conditions: WhereClause::new(),
        }
    }

    /// A criterion carrying only a where clause.
    pub fn with_where(conditions: impl Into<WhereClause>) -> Self {
        Self {
            values: None,
            conditions: conditions.into(),
        }
    }

    /// Sets the values, builder style.
    #[must_use]
    pub fn values(mut self, values: Row) -> Self {
        self.values = Some(values);
        self
    }

    /// Sets the where clause, builder style.
    #[must_use]
    pub fn filter(mut self, conditions: impl Into<WhereClause>) -> Self {
        self.conditions = conditions.into();
        self
    }

    /// The values, if any.
    #[must_use]
    pub fn value_row(&self) -> Option<&Row> {
        self.values.as_ref()
    }

    /// The where clause.
    #[must_use]
    pub fn where_clause(&self) -> &WhereClause {
        &self.conditions
    }

    /// Values flattened into one parameter map, for procedures that take
    /// plain parameter sets.
    #[must_use]
    pub fn into_values(self) -> Row {
        self.values.unwrap_or_default()
    }

    pub(crate) fn into_parts(self) -> (Option<Row>, WhereClause) {
        (self.values, self.conditions)
    }
}

/// An ordered list of criteria for one verb.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaSet(Vec<Criteria>);

impl CriteriaSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a criterion.
    pub fn push(&mut self, criteria: Criteria) {
        self.0.push(criteria);
    }

    /// Iterates criteria in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Criteria> {
        self.0.iter()
    }

    /// Number of criteria.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends every criterion of `other`.
    pub fn extend(&mut self, other: CriteriaSet) {
        self.0.extend(other.0);
    }

    /// All where-groups of all criteria, ORed into one clause.
    ///
    /// A criterion without conditions contributes an empty group, so the
    /// combined clause stays unrestricted.
    #[must_use]
    pub fn combined_where(&self) -> WhereClause {
        self.0
            .iter()
            .flat_map(|criteria| {
                let groups = &criteria.conditions.groups;
                if groups.is_empty() {
                    vec![AndGroup::new()]
                } else {
                    groups.clone()
                }
            })
            .collect()
    }

    /// Value columns of every criterion, deduplicated in first-seen order.
    #[must_use]
    pub fn value_columns(&self) -> Vec<&str> {
        let mut seen = indexmap::IndexSet::new();
        for criteria in &self.0 {
            if let Some(values) = &criteria.values {
                seen.extend(values.keys().map(String::as_str));
            }
        }
        seen.into_iter().collect()
    }
}

impl From<Vec<Criteria>> for CriteriaSet {
    fn from(criteria: Vec<Criteria>) -> Self {
        Self(criteria)
    }
}

impl From<Criteria> for CriteriaSet {
    fn from(criteria: Criteria) -> Self {
        Self(vec![criteria])
    }
}

impl FromIterator<Criteria> for CriteriaSet {
    fn from_iter<I: IntoIterator<Item = Criteria>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CriteriaSet {
    type Item = Criteria;
    type IntoIter = std::vec::IntoIter<Criteria>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CriteriaSet {
    type Item = &'a Criteria;
    type IntoIter = std::slice::Iter<'a, Criteria>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Criteria as handed to a procedure or filter: either a plain set, or a
/// diff from which the verb-matching list is taken.
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaInput {
    /// A set used as-is.
    Set(CriteriaSet),
    /// A four-verb envelope.
    Diff(Diff),
}

impl CriteriaInput {
    /// Resolves to the set that applies to `verb`.
    #[must_use]
    pub fn into_set(self, verb: Verb) -> CriteriaSet {
        match self {
            CriteriaInput::Set(set) => set,
            CriteriaInput::Diff(diff) => diff.take(verb),
        }
    }
}

impl From<CriteriaSet> for CriteriaInput {
    fn from(set: CriteriaSet) -> Self {
        CriteriaInput::Set(set)
    }
}

impl From<Vec<Criteria>> for CriteriaInput {
    fn from(criteria: Vec<Criteria>) -> Self {
        CriteriaInput::Set(criteria.into())
    }
}

impl From<Criteria> for CriteriaInput {
    fn from(criteria: Criteria) -> Self {
        CriteriaInput::Set(criteria.into())
    }
}

impl From<WhereClause> for CriteriaInput {
    fn from(clause: WhereClause) -> Self {
        CriteriaInput::Set(Criteria::with_where(clause).into())
    }
}

impl From<Diff> for CriteriaInput {
    fn from(diff: Diff) -> Self {
        CriteriaInput::Diff(diff)
    }
}

/// Builds an [`AndGroup`] of equality conditions from `(column, value)`
/// pairs.
pub fn equals<I, K, V>(pairs: I) -> AndGroup
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .fold(AndGroup::new(), |group, (column, value)| {
            group.with(column, Condition::eq(value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Operator;
    use quarry_codec::row;

    #[test]
    fn matching_row_uses_is_null_for_nulls() {
        let group = AndGroup::matching_row(&row! { "id" => 1, "note" => Value::Null });
        let ops: Vec<Operator> = group
            .iter()
            .map(|(_, conditions)| conditions[0].operator())
            .collect();
        assert_eq!(ops, vec![Operator::Eq, Operator::IsNull]);
    }

    #[test]
    fn multiple_conditions_on_one_column() {
        let group = AndGroup::new()
            .with("age", Condition::ge(18))
            .with("age", Condition::lt(65));
        assert_eq!(group.len(), 1);
        assert_eq!(group.iter().next().unwrap().1.len(), 2);
    }

    #[test]
    fn empty_groups_do_not_restrict() {
        assert!(WhereClause::new().is_empty());
        assert!(WhereClause::single(AndGroup::new()).is_empty());
        assert!(!WhereClause::single(equals([("a", 1)])).is_empty());
    }

    #[test]
    fn combined_where_ors_every_group() {
        let set: CriteriaSet = vec![
            Criteria::with_where(equals([("a", 1)])),
            Criteria::with_where(WhereClause::single(equals([("b", 2)])).or(equals([("c", 3)]))),
        ]
        .into();
        assert_eq!(set.combined_where().groups().len(), 3);
    }

    #[test]
    fn unrestricted_criteria_keep_combined_where_open() {
        let set: CriteriaSet = vec![Criteria::with_where(equals([("a", 1)])), Criteria::new()].into();
        let clause = set.combined_where();
        assert_eq!(clause.groups().len(), 2);
        assert!(clause.groups()[1].is_empty());
    }

    #[test]
    fn value_columns_dedupe() {
        let set: CriteriaSet = vec![
            Criteria::with_values(row! { "a" => 1, "b" => 2 }),
            Criteria::with_values(row! { "b" => 3, "c" => 4 }),
        ]
        .into();
        assert_eq!(set.value_columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn input_from_diff_picks_verb_list() {
        let mut diff = Diff::new();
        diff.insert.push(Criteria::with_values(row! { "a" => 1 }));
        let input = CriteriaInput::from(diff);
        assert_eq!(input.clone().into_set(Verb::Insert).len(), 1);
        assert!(input.into_set(Verb::Delete).is_empty());
    }
}
