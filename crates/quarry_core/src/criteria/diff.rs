//! Four-verb change envelopes.

use super::set::{AndGroup, Criteria, CriteriaSet, WhereClause};
use crate::types::Verb;
use quarry_codec::{row_key, Row, Value};
use std::collections::HashMap;

static NO_CRITERIA: CriteriaSet = CriteriaSet::new();

/// Select, insert, update, and delete lists bundled together.
///
/// Used both as a synchronization instruction for a
/// [`Model`](crate::Model) and as the report of what changed during a
/// diffed select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Criteria for the select verb (applied as the model filter).
    pub select: CriteriaSet,
    /// Rows to insert.
    pub insert: CriteriaSet,
    /// Rows to update.
    pub update: CriteriaSet,
    /// Rows to delete.
    pub delete: CriteriaSet,
}

impl Diff {
    /// An empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The list for `verb`. [`Verb::Call`] has none and gets an empty set.
    #[must_use]
    pub fn list(&self, verb: Verb) -> &CriteriaSet {
        match verb {
            Verb::Select => &self.select,
            Verb::Insert => &self.insert,
            Verb::Update => &self.update,
            Verb::Delete => &self.delete,
            Verb::Call => &NO_CRITERIA,
        }
    }

    /// Moves the list for `verb` out, leaving an empty one behind.
    pub fn take(self, verb: Verb) -> CriteriaSet {
        match verb {
            Verb::Select => self.select,
            Verb::Insert => self.insert,
            Verb::Update => self.update,
            Verb::Delete => self.delete,
            Verb::Call => CriteriaSet::new(),
        }
    }

    /// Whether every list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.select.is_empty()
            && self.insert.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
    }

    /// Compares two row collections by full-row equality.
    ///
    /// Rows only in `before` become `delete` criteria matching every
    /// column; rows only in `after` become `insert` values. Duplicates are
    /// counted, so two identical rows before and one after yield one
    /// delete. A changed row is reported as a delete plus an insert; no
    /// `update` entries are ever produced.
    #[must_use]
    pub fn between(before: &[Row], after: &[Row]) -> Self {
        let mut remaining: HashMap<Vec<(String, Value)>, usize> = HashMap::new();
        for row in after {
            *remaining.entry(row_key(row)).or_default() += 1;
        }

        let mut diff = Diff::new();
        let mut kept: HashMap<Vec<(String, Value)>, usize> = HashMap::new();
        for row in before {
            let key = row_key(row);
            match remaining.get_mut(&key) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    *kept.entry(key).or_default() += 1;
                }
                _ => diff
                    .delete
                    .push(Criteria::with_where(WhereClause::single(AndGroup::matching_row(row)))),
            }
        }

        for row in after {
            let key = row_key(row);
            match kept.get_mut(&key) {
                Some(count) if *count > 0 => *count -= 1,
                _ => diff.insert.push(Criteria::with_values(row.clone())),
            }
        }
        diff
    }
}
