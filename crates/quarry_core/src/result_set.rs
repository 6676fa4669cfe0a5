//! Ordered, keyed collections of rows.

use indexmap::{IndexMap, IndexSet};
use quarry_codec::{row_key, Row, Value};
use std::collections::HashSet;

/// Rows returned by one or more executions, with column metadata.
///
/// Rows are stored under stable integer keys. Keys are assigned in insertion
/// order and are never reused, so they need not be contiguous once a result
/// set has been derived from another.
///
/// # Invariants
///
/// - `columns()` is the union of every column of every row ever added, in
///   first-seen order, including rows merged in from another result set
/// - `last_affected()` lists identifiers in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: IndexMap<usize, Row>,
    columns: IndexSet<String>,
    last_affected: Vec<Value>,
    next_key: usize,
}

impl ResultSet {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result set from raw rows, keyed from zero.
    pub fn from_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let mut set = Self::new();
        for row in rows {
            set.push(row);
        }
        set
    }

    /// Appends a row, returning its key.
    pub(crate) fn push(&mut self, row: Row) -> usize {
        for column in row.keys() {
            if !self.columns.contains(column) {
                self.columns.insert(column.clone());
            }
        }
        let key = self.next_key;
        self.next_key += 1;
        self.rows.insert(key, row);
        key
    }

    /// Records identifiers reported by the connection after an execution.
    pub(crate) fn extend_affected(&mut self, ids: impl IntoIterator<Item = Value>) {
        self.last_affected.extend(ids);
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, first-seen order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Whether any row ever carried `column`.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Looks up a row by key.
    #[must_use]
    pub fn get(&self, key: usize) -> Option<&Row> {
        self.rows.get(&key)
    }

    /// Iterates `(key, row)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows.iter().map(|(key, row)| (*key, row))
    }

    /// Iterates rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Consumes the set, returning its rows in order.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows.into_values().collect()
    }

    /// Identifiers (e.g. generated keys) recorded by the executions that
    /// produced this set.
    #[must_use]
    pub fn last_affected(&self) -> &[Value] {
        &self.last_affected
    }

    /// Appends `other`'s rows and affected identifiers.
    ///
    /// With `filter_duplicates` this behaves like `UNION`: an incoming row
    /// equal (same columns, same values) to one already present, or to an
    /// earlier incoming row, is skipped. Without it, like `UNION ALL`.
    pub fn merge(&mut self, other: ResultSet, filter_duplicates: bool) {
        // Column metadata survives even when every row is filtered out.
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.insert(column);
            }
        }

        if filter_duplicates {
            let mut seen: HashSet<Vec<(String, Value)>> = self.rows.values().map(row_key).collect();
            for row in other.rows.into_values() {
                if seen.insert(row_key(&row)) {
                    self.push(row);
                }
            }
        } else {
            for row in other.rows.into_values() {
                self.push(row);
            }
        }

        self.last_affected.extend(other.last_affected);
    }
}

impl FromIterator<Row> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::from_rows(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_codec::row;

    #[test]
    fn columns_are_union_of_sparse_rows() {
        let set = ResultSet::from_rows(vec![
            row! { "id" => 1, "name" => "a" },
            row! { "id" => 2, "email" => "b@x" },
        ]);
        assert_eq!(set.columns(), vec!["id", "name", "email"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn merge_union_all_keeps_duplicates() {
        let mut left = ResultSet::from_rows(vec![row! { "id" => 1 }]);
        let right = ResultSet::from_rows(vec![row! { "id" => 1 }, row! { "id" => 2 }]);
        left.merge(right, false);
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn merge_union_skips_duplicates() {
        let mut left = ResultSet::from_rows(vec![row! { "id" => 1, "n" => "a" }]);
        let right = ResultSet::from_rows(vec![
            row! { "n" => "a", "id" => 1 },
            row! { "id" => 2 },
            row! { "id" => 2 },
        ]);
        left.merge(right, true);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn merge_keeps_columns_and_affected() {
        let mut left = ResultSet::new();
        left.extend_affected(vec![Value::Integer(1)]);

        let mut right = ResultSet::from_rows(vec![row! { "extra" => 1 }]);
        right.extend_affected(vec![Value::Integer(2)]);
        left.merge(right, true);

        assert!(left.has_column("extra"));
        assert_eq!(left.last_affected(), &[Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn keys_are_stable_after_merge() {
        let mut left = ResultSet::from_rows(vec![row! { "id" => 1 }]);
        left.merge(ResultSet::from_rows(vec![row! { "id" => 2 }]), false);
        let keys: Vec<usize> = left.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![0, 1]);
        assert_eq!(left.get(1).unwrap()["id"], Value::Integer(2));
    }
}
