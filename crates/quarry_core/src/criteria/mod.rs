//! Declarative CRUD intent.
//!
//! A [`Criteria`] describes one operation: the `values` to write (or
//! project) and a [`WhereClause`] of AND-groups ORed together. A
//! [`CriteriaSet`] is many of them for one verb; a [`Diff`] bundles one set
//! per verb.

mod condition;
mod diff;
mod eval;
mod set;
mod wire;

pub use condition::{Arity, Condition, ConditionShape, Operands, Operator, INVERSE_PREFIX};
pub use diff::Diff;
pub use eval::{compare_binary, like_to_regex, sql_compare, Matcher, RowFilter};
pub use set::{equals, AndGroup, Criteria, CriteriaInput, CriteriaSet, WhereClause};
