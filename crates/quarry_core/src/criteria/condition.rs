//! Conditions: an operator plus its operands.

use crate::error::{CoreError, CoreResult};
use quarry_codec::Value;
use std::fmt;

/// Wire prefix that marks a left/right-inverted operator.
pub const INVERSE_PREFIX: &str = "INVERSE ";

/// Comparison operators understood by the compiler and the in-memory filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `RLIKE` (regular expression match)
    Rlike,
    /// `NOT RLIKE`
    NotRlike,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `BETWEEN low AND high`
    Between,
    /// `NOT BETWEEN low AND high`
    NotBetween,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
}

/// How many operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No operands (`IS NULL`).
    Nullary,
    /// One operand (`=`, `LIKE`, ...).
    Unary,
    /// Two operands (`BETWEEN`).
    Binary,
    /// A non-empty list (`IN`).
    List,
}

impl Arity {
    fn describe(self) -> &'static str {
        match self {
            Arity::Nullary => "no operands",
            Arity::Unary => "exactly one operand",
            Arity::Binary => "exactly two operands",
            Arity::List => "a non-empty list",
        }
    }
}

impl Operator {
    /// Every operator.
    pub const ALL: [Operator; 16] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
        Operator::Like,
        Operator::NotLike,
        Operator::Rlike,
        Operator::NotRlike,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::Between,
        Operator::NotBetween,
        Operator::In,
        Operator::NotIn,
    ];

    /// SQL spelling.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Rlike => "RLIKE",
            Operator::NotRlike => "NOT RLIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Operand count this operator requires.
    #[must_use]
    pub const fn arity(self) -> Arity {
        match self {
            Operator::IsNull | Operator::IsNotNull => Arity::Nullary,
            Operator::Between | Operator::NotBetween => Arity::Binary,
            Operator::In | Operator::NotIn => Arity::List,
            _ => Arity::Unary,
        }
    }

    /// Parses a wire token such as `"NOT LIKE"` or `"INVERSE <="`.
    ///
    /// Returns the operator and whether it was inverted. Matching is
    /// case-insensitive and tolerant of repeated whitespace; `!=` is
    /// accepted for `<>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedOperator`] for anything else,
    /// including an inverted operator that does not take one operand.
    pub fn parse(token: &str) -> CoreResult<(Operator, bool)> {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        let (body, inverted) = match normalized.strip_prefix(INVERSE_PREFIX) {
            Some(rest) => (rest, true),
            None => (normalized.as_str(), false),
        };
        let body = if body == "!=" { "<>" } else { body };

        let operator = Operator::ALL
            .into_iter()
            .find(|op| op.sql() == body)
            .ok_or_else(|| CoreError::unsupported_operator(token))?;

        if inverted && operator.arity() != Arity::Unary {
            return Err(CoreError::unsupported_operator(token));
        }
        Ok((operator, inverted))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Operands attached to a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    /// No operands.
    None,
    /// A single operand.
    One(Value),
    /// Low and high bounds.
    Two(Value, Value),
    /// A list of candidates.
    List(Vec<Value>),
}

impl Operands {
    /// Number of placeholder slots these operands occupy.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Operands::None => 0,
            Operands::One(_) => 1,
            Operands::Two(..) => 2,
            Operands::List(values) => values.len(),
        }
    }

    /// Operand values in placeholder order.
    #[must_use]
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Operands::None => Vec::new(),
            Operands::One(value) => vec![value],
            Operands::Two(low, high) => vec![low, high],
            Operands::List(values) => values.iter().collect(),
        }
    }
}

/// One `(operator, operand...)` test against a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    operator: Operator,
    inverted: bool,
    operands: Operands,
}

/// The parts of a condition that decide statement shape.
///
/// Literal values are deliberately absent; only list *length* matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionShape {
    /// The operator.
    pub operator: Operator,
    /// Whether column and placeholder are swapped.
    pub inverted: bool,
    /// Number of operand slots.
    pub slots: usize,
}

impl Condition {
    /// Creates a condition, checking operand arity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OperandArity`] when `operands` does not fit
    /// `operator`.
    pub fn new(operator: Operator, operands: Operands) -> CoreResult<Self> {
        let condition = Self {
            operator,
            inverted: false,
            operands,
        };
        condition.validate()?;
        Ok(condition)
    }

    fn unary(operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            inverted: false,
            operands: Operands::One(value.into()),
        }
    }

    /// `column = value`
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Eq, value)
    }

    /// `column <> value`
    pub fn ne(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Ne, value)
    }

    /// `column < value`
    pub fn lt(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Lt, value)
    }

    /// `column > value`
    pub fn gt(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Gt, value)
    }

    /// `column <= value`
    pub fn le(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Le, value)
    }

    /// `column >= value`
    pub fn ge(value: impl Into<Value>) -> Self {
        Self::unary(Operator::Ge, value)
    }

    /// `column LIKE pattern`
    pub fn like(pattern: impl Into<Value>) -> Self {
        Self::unary(Operator::Like, pattern)
    }

    /// `column NOT LIKE pattern`
    pub fn not_like(pattern: impl Into<Value>) -> Self {
        Self::unary(Operator::NotLike, pattern)
    }

    /// `column RLIKE regex`
    pub fn rlike(pattern: impl Into<Value>) -> Self {
        Self::unary(Operator::Rlike, pattern)
    }

    /// `column NOT RLIKE regex`
    pub fn not_rlike(pattern: impl Into<Value>) -> Self {
        Self::unary(Operator::NotRlike, pattern)
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null() -> Self {
        Self {
            operator: Operator::IsNull,
            inverted: false,
            operands: Operands::None,
        }
    }

    /// `column IS NOT NULL`
    #[must_use]
    pub fn is_not_null() -> Self {
        Self {
            operator: Operator::IsNotNull,
            inverted: false,
            operands: Operands::None,
        }
    }

    /// `column BETWEEN low AND high`
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            operator: Operator::Between,
            inverted: false,
            operands: Operands::Two(low.into(), high.into()),
        }
    }

    /// `column NOT BETWEEN low AND high`
    pub fn not_between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            operator: Operator::NotBetween,
            inverted: false,
            operands: Operands::Two(low.into(), high.into()),
        }
    }

    /// `column IN (values...)`
    pub fn in_list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            operator: Operator::In,
            inverted: false,
            operands: Operands::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// `column NOT IN (values...)`
    pub fn not_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            operator: Operator::NotIn,
            inverted: false,
            operands: Operands::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Swaps column and operand: `operand OP column`.
    ///
    /// # Errors
    ///
    /// Only single-operand operators can be inverted.
    pub fn inverse(mut self) -> CoreResult<Self> {
        if self.operator.arity() != Arity::Unary {
            return Err(CoreError::unsupported_operator(format!(
                "{INVERSE_PREFIX}{}",
                self.operator
            )));
        }
        self.inverted = !self.inverted;
        Ok(self)
    }

    /// The operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Whether column and operand are swapped.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// The operands.
    #[must_use]
    pub fn operands(&self) -> &Operands {
        &self.operands
    }

    /// The wire token for this condition's operator.
    #[must_use]
    pub fn token(&self) -> String {
        if self.inverted {
            format!("{INVERSE_PREFIX}{}", self.operator)
        } else {
            self.operator.sql().to_string()
        }
    }

    /// Shape used for statement deduplication.
    #[must_use]
    pub fn shape(&self) -> ConditionShape {
        ConditionShape {
            operator: self.operator,
            inverted: self.inverted,
            slots: self.operands.count(),
        }
    }

    /// Checks that the operands fit the operator.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OperandArity`] on mismatch.
    pub fn validate(&self) -> CoreResult<()> {
        let arity = self.operator.arity();
        let fits = match (&self.operands, arity) {
            (Operands::None, Arity::Nullary)
            | (Operands::One(_), Arity::Unary)
            | (Operands::Two(..), Arity::Binary) => true,
            (Operands::List(values), Arity::List) => !values.is_empty(),
            _ => false,
        };

        if fits {
            Ok(())
        } else {
            Err(CoreError::OperandArity {
                operator: self.token(),
                expected: arity.describe(),
                actual: self.operands.count(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tokens() {
        assert_eq!(Operator::parse("=").unwrap(), (Operator::Eq, false));
        assert_eq!(Operator::parse("not   like").unwrap(), (Operator::NotLike, false));
        assert_eq!(Operator::parse("!=").unwrap(), (Operator::Ne, false));
        assert_eq!(Operator::parse("is null").unwrap(), (Operator::IsNull, false));
        assert_eq!(
            Operator::parse("INVERSE LIKE").unwrap(),
            (Operator::Like, true)
        );
    }

    #[test]
    fn parse_rejects_unknown_and_bad_inversions() {
        assert!(matches!(
            Operator::parse("SOUNDS LIKE"),
            Err(CoreError::UnsupportedOperator { .. })
        ));
        assert!(Operator::parse("INVERSE IN").is_err());
    }

    #[test]
    fn arity_is_checked() {
        assert!(Condition::new(Operator::Between, Operands::One(Value::Integer(1))).is_err());
        assert!(Condition::new(Operator::In, Operands::List(vec![])).is_err());
        assert!(Condition::new(Operator::IsNull, Operands::None).is_ok());
        assert!(Condition::in_list([1, 2]).validate().is_ok());
    }

    #[test]
    fn shape_ignores_literals_but_not_list_length() {
        assert_eq!(Condition::eq(1).shape(), Condition::eq("x").shape());
        assert_ne!(
            Condition::in_list([1, 2, 3]).shape(),
            Condition::in_list([1, 2, 3, 4, 5]).shape()
        );
    }

    #[test]
    fn operand_values_in_order() {
        let between = Condition::between(1, 9);
        assert_eq!(
            between.operands().values(),
            vec![&Value::Integer(1), &Value::Integer(9)]
        );
    }

    #[test]
    fn inverse_only_for_unary() {
        assert!(Condition::like("%a%").inverse().unwrap().is_inverted());
        assert!(Condition::is_null().inverse().is_err());
        assert_eq!(Condition::lt(3).inverse().unwrap().token(), "INVERSE <");
    }
}
