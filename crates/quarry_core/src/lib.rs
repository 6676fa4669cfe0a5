//! # Quarry Core
//!
//! Criteria-driven SQL execution over opaque database connections.
//!
//! This crate provides:
//! - Criteria and diffs: structured `values` / `where` descriptions of
//!   row changes, with their JSON and CBOR wire form
//! - A criteria compiler that turns an SQL skeleton plus criteria into
//!   deduplicated, parameterized statements
//! - Statements and statement groups with configurable result shapes
//! - A transaction coordinator with per-step savepoints, iterations,
//!   interstitial logic, and multi-connection commit and rollback
//! - An in-memory [`Model`] that selects, filters, sorts, joins, pivots,
//!   computes diffs, and writes changes back
//!
//! ## Usage
//!
//! ```
//! use quarry_core::{compile, equals, Criteria, CriteriaSet, Skeleton, Verb};
//!
//! let skeleton = Skeleton::parse("SELECT * FROM people WHERE <<condition>>").unwrap();
//! let criteria: CriteriaSet = vec![
//!     Criteria::with_where(equals([("city", "Oslo")])),
//!     Criteria::with_where(equals([("city", "Bergen")])),
//! ]
//! .into();
//!
//! let statements = compile(&skeleton, Verb::Select, &criteria).unwrap();
//! assert_eq!(statements.len(), 1);
//! assert_eq!(statements[0].sql, "SELECT * FROM people WHERE city = :w_city");
//! assert_eq!(statements[0].params.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod criteria;
mod error;
mod model;
mod procedure;
mod result_set;
mod statement;
mod transaction;
mod types;

pub use config::{Config, ErrorDetail};
pub use criteria::{
    compare_binary, equals, like_to_regex, sql_compare, AndGroup, Arity, Condition,
    ConditionShape, Criteria, CriteriaInput, CriteriaSet, Diff, Matcher, Operands, Operator,
    RowFilter, WhereClause, INVERSE_PREFIX,
};
pub use error::{BoxError, CoreError, CoreResult, ErrorCategory};
pub use model::{Changes, JoinKind, JoinOn, Model, Pivot, SortDirection, SortKey};
pub use procedure::{Output, Payload, Procedure};
pub use result_set::ResultSet;
pub use statement::{
    compile, sanitize, scan_placeholders, validate_identifier, CompiledStatement, ShapeKey,
    Skeleton, Statement, StatementGroup, COLUMNS_MARKER, CONDITION_MARKER, VALUES_MARKER,
};
pub use transaction::{
    Interlude, Interstitial, Iteration, NextStep, Step, StepKind, StepRecord, Transaction,
    TransactionState,
};
pub use types::{ResultShape, Verb};

pub use quarry_codec::{row, Row, Value};
pub use quarry_connection::{Connection, Params};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
