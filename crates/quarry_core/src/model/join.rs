//! Joining two models into a new detached one.

use super::Model;
use crate::criteria::{compare_binary, Arity, Operator};
use crate::error::{CoreError, CoreResult};
use indexmap::IndexSet;
use quarry_codec::{Row, Value};

/// Which unmatched rows survive a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Matched pairs only.
    Inner,
    /// Plus unmatched left rows.
    Left,
    /// Plus unmatched right rows.
    Right,
    /// Plus unmatched rows of both sides.
    Full,
    /// Every pair; any condition is ignored.
    Cross,
}

/// How rows are paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    /// Equality on a column both sides have. The column appears once in
    /// the output.
    Using(String),
    /// `left <op> right`, with any single-operand comparison or pattern
    /// operator.
    On {
        /// Column of the left model.
        left: String,
        /// Comparison operator.
        operator: Operator,
        /// Column of the right model.
        right: String,
    },
    /// Every pair matches.
    Always,
}

impl JoinOn {
    /// Equality on a shared column.
    pub fn using(column: impl Into<String>) -> Self {
        JoinOn::Using(column.into())
    }

    /// `left <operator> right`, with the operator given as an SQL token
    /// such as `"<="` or `"LIKE"`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedOperator`] for an unknown token, an
    /// inverted form, or an operator that does not take one operand.
    pub fn on(left: impl Into<String>, operator: &str, right: impl Into<String>) -> CoreResult<Self> {
        let (parsed, inverted) = Operator::parse(operator)?;
        if inverted || parsed.arity() != Arity::Unary {
            return Err(CoreError::unsupported_operator(operator));
        }
        Ok(JoinOn::On {
            left: left.into(),
            operator: parsed,
            right: right.into(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Left(&'a str),
    Right(&'a str),
    Shared(&'a str),
}

impl Model {
    /// Joins this model (left) with `other` (right) into a new detached
    /// model.
    ///
    /// Only rows passing each side's filter take part. Output columns are
    /// the left columns then the right ones. A column present on both
    /// sides (other than a `USING` column) is renamed `model.column` on
    /// each side when the two models have distinct, non-empty names.
    /// Missing cells of unmatched rows are `NULL`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownColumn`] for a join column a side lacks,
    /// [`CoreError::AmbiguousColumn`] when a clash cannot be resolved by
    /// renaming, or a pattern error from a `LIKE`/`RLIKE` condition.
    pub fn join(&self, kind: JoinKind, other: &Model, on: &JoinOn) -> CoreResult<Model> {
        match on {
            JoinOn::Using(column) => {
                self.require_column(column)?;
                other.require_column(column)?;
            }
            JoinOn::On {
                left,
                operator,
                right,
            } => {
                self.require_column(left)?;
                other.require_column(right)?;
                if operator.arity() != Arity::Unary {
                    return Err(CoreError::unsupported_operator(operator.sql()));
                }
            }
            JoinOn::Always => {}
        }

        let (columns, sources) = self.join_columns(other, on)?;
        let build = |left: Option<&Row>, right: Option<&Row>| -> Row {
            columns
                .iter()
                .zip(&sources)
                .map(|(name, source)| {
                    let cell = match *source {
                        Source::Left(column) => left.and_then(|row| row.get(column)),
                        Source::Right(column) => right.and_then(|row| row.get(column)),
                        Source::Shared(column) => left
                            .and_then(|row| row.get(column))
                            .or_else(|| right.and_then(|row| row.get(column))),
                    };
                    (name.clone(), cell.cloned().unwrap_or(Value::Null))
                })
                .collect()
        };

        let right_rows: Vec<&Row> = other.rows().collect();
        let mut matched_right = vec![false; right_rows.len()];
        let mut rows = Vec::new();

        for left in self.rows() {
            let mut matched = false;
            for (j, right) in right_rows.iter().enumerate() {
                if kind == JoinKind::Cross || pairs(on, left, right)? {
                    rows.push(build(Some(left), Some(*right)));
                    matched_right[j] = true;
                    matched = true;
                }
            }
            if !matched && matches!(kind, JoinKind::Left | JoinKind::Full) {
                rows.push(build(Some(left), None));
            }
        }
        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            for (right, _) in right_rows.iter().zip(&matched_right).filter(|(_, hit)| !**hit) {
                rows.push(build(None, Some(*right)));
            }
        }

        tracing::debug!(left = %self.name, right = %other.name, ?kind, rows = rows.len(), "joined");
        let mut joined =
            Model::new(format!("{}_{}", self.name, other.name)).with_config(self.config.clone());
        joined.replace_rows(rows, columns);
        Ok(joined)
    }

    fn join_columns<'a>(
        &'a self,
        other: &'a Model,
        on: &'a JoinOn,
    ) -> CoreResult<(IndexSet<String>, Vec<Source<'a>>)> {
        let shared = match on {
            JoinOn::Using(column) => Some(column.as_str()),
            _ => None,
        };
        let clashes = |column: &str| {
            Some(column) != shared && self.has_column(column) && other.has_column(column)
        };
        let qualify = !self.name.is_empty() && !other.name.is_empty() && self.name != other.name;

        let mut columns = IndexSet::new();
        let mut sources = Vec::new();
        let sides = self
            .columns
            .iter()
            .map(|column| (self, column, Source::Left(column.as_str())))
            .chain(
                other
                    .columns
                    .iter()
                    .map(|column| (other, column, Source::Right(column.as_str()))),
            );

        for (model, column, source) in sides {
            let (name, source) = if Some(column.as_str()) == shared {
                (column.clone(), Source::Shared(column.as_str()))
            } else if clashes(column.as_str()) {
                if !qualify {
                    return Err(CoreError::AmbiguousColumn {
                        column: column.clone(),
                    });
                }
                (format!("{}.{}", model.name, column), source)
            } else {
                (column.clone(), source)
            };
            if columns.insert(name) {
                sources.push(source);
            }
        }
        Ok((columns, sources))
    }
}

fn pairs(on: &JoinOn, left: &Row, right: &Row) -> CoreResult<bool> {
    let cell = |row: &Row, column: &str| row.get(column).cloned().unwrap_or(Value::Null);
    match on {
        JoinOn::Using(column) => {
            let column = column.as_str();
            compare_binary(Operator::Eq, &cell(left, column), &cell(right, column))
        }
        JoinOn::On {
            left: l,
            operator,
            right: r,
        } => compare_binary(*operator, &cell(left, l.as_str()), &cell(right, r.as_str())),
        JoinOn::Always => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{equals, Criteria};
    use quarry_codec::row;

    fn users() -> Model {
        Model::from_rows(
            "users",
            vec![
                row! { "id" => 1, "name" => "ada" },
                row! { "id" => 2, "name" => "bob" },
                row! { "id" => 3, "name" => "cy" },
            ],
        )
    }

    fn orders() -> Model {
        Model::from_rows(
            "orders",
            vec![
                row! { "id" => 1, "item" => "pen" },
                row! { "id" => 1, "item" => "ink" },
                row! { "id" => 4, "item" => "cup" },
            ],
        )
    }

    #[test]
    fn inner_using_keeps_one_key_column() {
        let joined = users().join(JoinKind::Inner, &orders(), &JoinOn::using("id")).unwrap();
        assert_eq!(joined.columns(), ["id", "name", "item"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.row(1).unwrap()["item"], Value::from("ink"));
    }

    #[test]
    fn outer_joins_fill_nulls() {
        let left = users().join(JoinKind::Left, &orders(), &JoinOn::using("id")).unwrap();
        assert_eq!(left.len(), 4);
        assert_eq!(left.row(3).unwrap()["item"], Value::Null);

        let right = users().join(JoinKind::Right, &orders(), &JoinOn::using("id")).unwrap();
        assert_eq!(right.len(), 3);
        let cup = right.row(2).unwrap();
        assert_eq!(cup["id"], Value::Integer(4));
        assert_eq!(cup["name"], Value::Null);

        let full = users().join(JoinKind::Full, &orders(), &JoinOn::using("id")).unwrap();
        assert_eq!(full.len(), 5);
    }

    #[test]
    fn on_condition_qualifies_clashing_columns() {
        let condition = JoinOn::on("id", "<", "id").unwrap();
        let joined = users().join(JoinKind::Inner, &orders(), &condition).unwrap();
        assert_eq!(joined.columns(), ["users.id", "name", "orders.id", "item"]);
        // Every user id is below 4.
        assert_eq!(joined.len(), 3);
    }

    #[test]
    fn cross_join_pairs_everything() {
        let joined = users().join(JoinKind::Cross, &orders(), &JoinOn::Always).unwrap();
        assert_eq!(joined.len(), 9);
    }

    #[test]
    fn join_respects_filters() {
        let mut left = users();
        left.set_filter(Criteria::with_where(equals([("name", "ada")]))).unwrap();
        let joined = left.join(JoinKind::Left, &orders(), &JoinOn::using("id")).unwrap();
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn unresolvable_clash_is_ambiguous() {
        let a = Model::from_rows("same", vec![row! { "k" => 1, "v" => 1 }]);
        let b = Model::from_rows("same", vec![row! { "k" => 1, "v" => 2 }]);
        assert!(matches!(
            a.join(JoinKind::Inner, &b, &JoinOn::using("k")),
            Err(CoreError::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn join_validation() {
        assert!(matches!(
            users().join(JoinKind::Inner, &orders(), &JoinOn::using("item")),
            Err(CoreError::UnknownColumn { .. })
        ));
        assert!(JoinOn::on("id", "IN", "id").is_err());
        assert!(JoinOn::on("id", "INVERSE =", "id").is_err());
    }

    #[test]
    fn nulls_never_join() {
        let a = Model::from_rows("a", vec![row! { "k" => Value::Null }]);
        let b = Model::from_rows("b", vec![row! { "k" => Value::Null }]);
        let joined = a.join(JoinKind::Inner, &b, &JoinOn::using("k")).unwrap();
        assert!(joined.is_empty());
    }
}
