//! In-memory evaluation of conditions with SQL comparison semantics.
//!
//! - Any comparison involving `NULL` is unknown, which never matches
//! - Text compares case-insensitively; numbers numerically
//! - Text that parses as a number compares numerically against a number
//! - `LIKE` translates `%` and `_` into an anchored, case-insensitive regex

use super::condition::{Condition, Operands, Operator};
use super::set::{AndGroup, WhereClause};
use crate::error::{CoreError, CoreResult};
use quarry_codec::{Row, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Integer(_) | Value::Float(_) => value.as_f64(),
        Value::Text(text) => text.trim().parse::<f64>().ok(),
        Value::Null => None,
    }
}

/// Compares two cells the way a SQL engine with a case-insensitive
/// collation would. `None` means unknown (a `NULL` was involved).
#[must_use]
pub fn sql_compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(
                left.to_string()
                    .to_lowercase()
                    .cmp(&right.to_string().to_lowercase()),
            ),
        },
    }
}

/// Translates a `LIKE` pattern into an anchored regular expression.
#[must_use]
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

fn build_regex(source: &str, pattern: &str) -> CoreResult<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn pattern_regex(operator: Operator, pattern: &Value) -> CoreResult<Option<Regex>> {
    let text = match pattern {
        Value::Null => return Ok(None),
        other => other.to_string(),
    };
    let source = match operator {
        Operator::Like | Operator::NotLike => like_to_regex(&text),
        _ => text.clone(),
    };
    build_regex(&source, &text).map(Some)
}

/// Evaluates `left OP right` for a single-operand operator.
///
/// Used both for filters (cell against operand) and for `ON`-style joins
/// (cell against cell).
///
/// # Errors
///
/// Returns [`CoreError::InvalidPattern`] if a `LIKE`/`RLIKE` pattern does
/// not compile, or [`CoreError::UnsupportedOperator`] for operators that
/// do not take exactly one operand.
pub fn compare_binary(operator: Operator, left: &Value, right: &Value) -> CoreResult<bool> {
    let ordering = || sql_compare(left, right);
    Ok(match operator {
        Operator::Eq => ordering() == Some(Ordering::Equal),
        Operator::Ne => matches!(ordering(), Some(o) if o != Ordering::Equal),
        Operator::Lt => ordering() == Some(Ordering::Less),
        Operator::Gt => ordering() == Some(Ordering::Greater),
        Operator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Like | Operator::NotLike | Operator::Rlike | Operator::NotRlike => {
            if left.is_null() {
                return Ok(false);
            }
            let Some(regex) = pattern_regex(operator, right)? else {
                return Ok(false);
            };
            let hit = regex.is_match(&left.to_string());
            match operator {
                Operator::NotLike | Operator::NotRlike => !hit,
                _ => hit,
            }
        }
        other => return Err(CoreError::unsupported_operator(other.sql())),
    })
}

/// A condition prepared for repeated evaluation.
#[derive(Debug, Clone)]
pub struct Matcher {
    condition: Condition,
    regex: Option<Regex>,
}

impl Matcher {
    /// Prepares `condition`, compiling its pattern once when possible.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPattern`] for a bad pattern.
    pub fn new(condition: &Condition) -> CoreResult<Self> {
        let regex = match (condition.operator(), condition.operands()) {
            (
                op @ (Operator::Like | Operator::NotLike | Operator::Rlike | Operator::NotRlike),
                Operands::One(pattern),
            ) if !condition.is_inverted() => pattern_regex(op, pattern)?,
            _ => None,
        };
        Ok(Self {
            condition: condition.clone(),
            regex,
        })
    }

    /// Whether `cell` satisfies the condition.
    ///
    /// # Errors
    ///
    /// Only inverted pattern operators can fail here, when the cell itself
    /// is not a valid pattern.
    pub fn matches(&self, cell: &Value) -> CoreResult<bool> {
        let operator = self.condition.operator();
        match self.condition.operands() {
            Operands::None => Ok(match operator {
                Operator::IsNull => cell.is_null(),
                _ => !cell.is_null(),
            }),
            Operands::One(operand) => {
                if let Some(regex) = &self.regex {
                    if cell.is_null() {
                        return Ok(false);
                    }
                    let hit = regex.is_match(&cell.to_string());
                    return Ok(match operator {
                        Operator::NotLike | Operator::NotRlike => !hit,
                        _ => hit,
                    });
                }
                if self.condition.is_inverted() {
                    compare_binary(operator, operand, cell)
                } else {
                    compare_binary(operator, cell, operand)
                }
            }
            Operands::Two(low, high) => {
                let lower = sql_compare(cell, low);
                let upper = sql_compare(cell, high);
                let inside = match (lower, upper) {
                    (Some(l), Some(u)) => l != Ordering::Less && u != Ordering::Greater,
                    _ => return Ok(false),
                };
                Ok(if operator == Operator::NotBetween {
                    !inside
                } else {
                    inside
                })
            }
            Operands::List(values) => {
                if cell.is_null() {
                    return Ok(false);
                }
                let found = values
                    .iter()
                    .any(|value| sql_compare(cell, value) == Some(Ordering::Equal));
                Ok(if operator == Operator::NotIn {
                    // A NULL in the list makes NOT IN unknown.
                    !found && !values.iter().any(Value::is_null)
                } else {
                    found
                })
            }
        }
    }
}

/// A where clause prepared for filtering rows.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    groups: Vec<Vec<(String, Matcher)>>,
}

impl RowFilter {
    /// Prepares every condition of `clause`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPattern`] for a bad pattern.
    pub fn new(clause: &WhereClause) -> CoreResult<Self> {
        // An empty group is `1=1`, which makes the whole OR true.
        if clause.groups().iter().any(AndGroup::is_empty) {
            return Ok(Self::default());
        }
        let groups = clause
            .groups()
            .iter()
            .map(|group| {
                let mut matchers = Vec::new();
                for (column, conditions) in group.iter() {
                    for condition in conditions {
                        matchers.push((column.to_string(), Matcher::new(condition)?));
                    }
                }
                Ok(matchers)
            })
            .collect::<CoreResult<_>>()?;
        Ok(Self { groups })
    }

    /// Whether the filter places no restriction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `row` passes. A column missing from the row reads as `NULL`.
    ///
    /// # Errors
    ///
    /// Propagates pattern errors from inverted pattern operators.
    pub fn matches(&self, row: &Row) -> CoreResult<bool> {
        if self.groups.is_empty() {
            return Ok(true);
        }
        for group in &self.groups {
            let mut all = true;
            for (column, matcher) in group {
                let cell = row.get(column).unwrap_or(&Value::Null);
                if !matcher.matches(cell)? {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::equals;
    use quarry_codec::row;

    fn check(condition: Condition, cell: impl Into<Value>) -> bool {
        Matcher::new(&condition).unwrap().matches(&cell.into()).unwrap()
    }

    #[test]
    fn text_equality_ignores_case() {
        assert!(check(Condition::eq("ADA"), "ada"));
        assert!(check(Condition::lt("b"), "A"));
    }

    #[test]
    fn numbers_compare_numerically_even_as_text() {
        assert!(check(Condition::gt(9), 10));
        assert!(check(Condition::gt(9), "10"));
        assert!(check(Condition::eq(1.0), 1));
    }

    #[test]
    fn null_never_matches_comparisons() {
        assert!(!check(Condition::eq(1), Value::Null));
        assert!(!check(Condition::ne(1), Value::Null));
        assert!(check(Condition::is_null(), Value::Null));
        assert!(!check(Condition::is_not_null(), Value::Null));
    }

    #[test]
    fn like_patterns() {
        assert!(check(Condition::like("a%"), "Abc"));
        assert!(check(Condition::like("a_c"), "abc"));
        assert!(!check(Condition::like("a_c"), "abbc"));
        assert!(check(Condition::like("1.5%"), "1.50"));
        assert!(!check(Condition::like("1.5%"), "105"));
        assert!(check(Condition::not_like("x%"), "abc"));
    }

    #[test]
    fn rlike_patterns() {
        assert!(check(Condition::rlike("^a.c$"), "ABC"));
        assert!(check(Condition::not_rlike("^z"), "abc"));
        assert!(matches!(
            Matcher::new(&Condition::rlike("(")),
            Err(CoreError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn inverted_like_uses_cell_as_pattern() {
        let condition = Condition::like("abc").inverse().unwrap();
        assert!(check(condition.clone(), "a%"));
        assert!(!check(condition, "z%"));
    }

    #[test]
    fn inverted_comparison_swaps_sides() {
        // 5 < cell
        let condition = Condition::lt(5).inverse().unwrap();
        assert!(check(condition.clone(), 6));
        assert!(!check(condition, 4));
    }

    #[test]
    fn between_and_in() {
        assert!(check(Condition::between(1, 3), 3));
        assert!(!check(Condition::between(1, 3), 4));
        assert!(check(Condition::not_between(1, 3), 4));
        assert!(check(Condition::in_list(["a", "b"]), "B"));
        assert!(check(Condition::not_in([1, 2]), 3));
        assert!(!check(Condition::not_in(vec![Value::Integer(1), Value::Null]), 3));
    }

    #[test]
    fn row_filter_ors_groups() {
        let clause = WhereClause::single(equals([("a", 1)])).or(equals([("b", 2)]));
        let filter = RowFilter::new(&clause).unwrap();
        assert!(filter.matches(&row! { "a" => 1, "b" => 0 }).unwrap());
        assert!(filter.matches(&row! { "a" => 0, "b" => 2 }).unwrap());
        assert!(!filter.matches(&row! { "a" => 0, "b" => 0 }).unwrap());
    }

    #[test]
    fn empty_filter_matches_all() {
        let filter = RowFilter::new(&WhereClause::single(AndGroup::new())).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&row! { "a" => 1 }).unwrap());
    }

    #[test]
    fn empty_group_opens_the_whole_clause() {
        let clause = WhereClause::single(AndGroup::new()).or(equals([("name", "a")]));
        let filter = RowFilter::new(&clause).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&row! { "name" => "b" }).unwrap());

        let clause = WhereClause::single(equals([("name", "a")])).or(AndGroup::new());
        assert!(RowFilter::new(&clause).unwrap().matches(&row! { "name" => "b" }).unwrap());
    }
}
