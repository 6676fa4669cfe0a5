//! Core type definitions for quarry.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The statement verb a criteria set or procedure is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// Read rows.
    Select,
    /// Add rows.
    Insert,
    /// Change rows.
    Update,
    /// Remove rows.
    Delete,
    /// Stored procedure or other opaque call.
    Call,
}

impl Verb {
    /// Every verb, in wire order.
    pub const ALL: [Verb; 5] = [
        Verb::Select,
        Verb::Insert,
        Verb::Update,
        Verb::Delete,
        Verb::Call,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Verb::Select => "select",
            Verb::Insert => "insert",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Call => "call",
        }
    }

    /// Guesses the verb from the leading keyword of a SQL string.
    ///
    /// Anything unrecognized is treated as [`Verb::Call`].
    #[must_use]
    pub fn infer(sql: &str) -> Self {
        let keyword: String = sql
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match keyword.as_str() {
            "select" | "with" | "show" | "pragma" | "explain" => Verb::Select,
            "insert" | "replace" => Verb::Insert,
            "update" => Verb::Update,
            "delete" => Verb::Delete,
            _ => Verb::Call,
        }
    }

    /// Result policy used when none is given explicitly.
    #[must_use]
    pub const fn default_shape(self) -> ResultShape {
        match self {
            Verb::Select => ResultShape::UnionAll,
            Verb::Call => ResultShape::PerCall,
            Verb::Insert | Verb::Update | Verb::Delete => ResultShape::None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::malformed(format!("unknown verb `{s}`")))
    }
}

/// How the rows of repeated executions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// Rows are discarded; only affected identifiers are kept.
    None,
    /// One result set per execution.
    PerCall,
    /// Executions merged into one result set without duplicates.
    Union,
    /// Executions merged into one result set, duplicates kept.
    UnionAll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_infer_from_sql() {
        assert_eq!(Verb::infer("  select * from t"), Verb::Select);
        assert_eq!(Verb::infer("WITH x AS (SELECT 1) SELECT * FROM x"), Verb::Select);
        assert_eq!(Verb::infer("INSERT INTO t VALUES (1)"), Verb::Insert);
        assert_eq!(Verb::infer("update t set a = 1"), Verb::Update);
        assert_eq!(Verb::infer("DELETE FROM t"), Verb::Delete);
        assert_eq!(Verb::infer("CALL refresh()"), Verb::Call);
    }

    #[test]
    fn verb_parse_roundtrip() {
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
        assert!("merge".parse::<Verb>().is_err());
    }

    #[test]
    fn default_shapes() {
        assert_eq!(Verb::Select.default_shape(), ResultShape::UnionAll);
        assert_eq!(Verb::Insert.default_shape(), ResultShape::None);
        assert_eq!(Verb::Call.default_shape(), ResultShape::PerCall);
    }
}
