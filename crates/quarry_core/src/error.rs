//! Error types for quarry core.

use crate::config::{Config, ErrorDetail};
use crate::types::Verb;
use quarry_codec::CodecError;
use quarry_connection::ConnectionError;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error returned by caller-supplied interstitial logic.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Broad failure category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad skeleton or criteria shape; raised at compile time, never retried.
    Compile,
    /// Driver-level failure while preparing or executing.
    Execution,
    /// Plan or transaction misuse, or a failed step.
    Coordination,
    /// Misuse of a [`Model`](crate::Model).
    Model,
    /// Wire encoding or decoding failure.
    Codec,
}

/// Errors that can occur in quarry core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The operator token is not one the engine understands.
    #[error("unsupported operator: {operator}")]
    UnsupportedOperator {
        /// The operator as written.
        operator: String,
    },

    /// Operands do not fit the operator's arity.
    #[error("operator {operator} expects {expected}, got {actual} operand(s)")]
    OperandArity {
        /// The operator.
        operator: String,
        /// What the operator accepts.
        expected: &'static str,
        /// How many operands were supplied.
        actual: usize,
    },

    /// A criterion lacks a key its verb requires.
    #[error("criterion {index} for {verb} is missing `{key}`")]
    MissingKey {
        /// Position of the criterion in its set.
        index: usize,
        /// The verb being compiled.
        verb: Verb,
        /// The missing key.
        key: &'static str,
    },

    /// A criterion carries a key its verb does not allow.
    #[error("criterion {index} for {verb} must not carry `{key}`")]
    UnexpectedKey {
        /// Position of the criterion in its set.
        index: usize,
        /// The verb being compiled.
        verb: Verb,
        /// The unexpected key.
        key: &'static str,
    },

    /// The SQL skeleton is unusable for the requested verb.
    #[error("invalid skeleton: {message}")]
    InvalidSkeleton {
        /// What is wrong with it.
        message: String,
    },

    /// A column name cannot be rendered into SQL safely.
    #[error("invalid identifier `{name}`")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },

    /// Criteria on the wire did not have the expected structure.
    #[error("malformed criteria: {message}")]
    MalformedCriteria {
        /// What is wrong with it.
        message: String,
    },

    /// A parameter set does not cover every placeholder of a statement.
    #[error("missing parameter(s): {}", missing.join(", "))]
    ParameterMismatch {
        /// Placeholder names without a bound value.
        missing: Vec<String>,
    },

    /// A `LIKE`/`RLIKE` pattern could not be compiled.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Regex compiler message.
        message: String,
    },

    /// The driver failed while preparing or executing a statement.
    #[error("execution failed on {connection}: {sql}")]
    Execution {
        /// Name of the connection.
        connection: String,
        /// The SQL that failed.
        sql: String,
        /// The driver error.
        #[source]
        source: ConnectionError,
    },

    /// A transaction boundary operation failed.
    #[error("{operation} failed on {connection}")]
    TransactionControl {
        /// Name of the connection.
        connection: String,
        /// `begin`, `savepoint`, `commit`, or `rollback`.
        operation: &'static str,
        /// The driver error.
        #[source]
        source: ConnectionError,
    },

    /// A step needed a connection and none was registered.
    #[error("no connection available: {message}")]
    NoConnection {
        /// What needed the connection.
        message: String,
    },

    /// An operation was called in a state that does not allow it.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the call is not allowed now.
        message: String,
    },

    /// An iteration named a step that is not in the plan.
    #[error("unknown step `{name}`")]
    UnknownStep {
        /// The step name.
        name: String,
    },

    /// Two steps share a name.
    #[error("duplicate step `{name}`")]
    DuplicateStep {
        /// The step name.
        name: String,
    },

    /// A payload cannot be applied to the procedure it was given to.
    #[error("payload mismatch: {message}")]
    PayloadMismatch {
        /// Why it does not fit.
        message: String,
    },

    /// A database step failed; the step was rolled back to its savepoint.
    #[error("step `{step}` failed in iteration {iteration}")]
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// Iteration index.
        iteration: usize,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Caller-supplied interstitial logic failed.
    #[error("interstitial `{step}` failed in iteration {iteration}")]
    UserLogic {
        /// Name of the failing step.
        step: String,
        /// Iteration index.
        iteration: usize,
        /// The error returned by the caller's function.
        #[source]
        source: BoxError,
    },

    /// Rolling back after a failure failed on at least one connection.
    ///
    /// `source` is the most recent rollback error; `cause` is the failure
    /// that triggered the rollback.
    #[error("rollback after failure did not complete ({cause})")]
    RollbackFailed {
        /// The failure that triggered the rollback.
        cause: Box<CoreError>,
        /// The last rollback error encountered.
        #[source]
        source: ConnectionError,
    },

    /// The model has no procedure for the requested verb.
    #[error("no {verb} procedure defined")]
    ProcedureUndefined {
        /// The verb that was requested.
        verb: Verb,
    },

    /// A column referenced by filter, sort, join, or pivot does not exist.
    #[error("unknown column `{column}`")]
    UnknownColumn {
        /// The column name.
        column: String,
    },

    /// A single result set was expected.
    #[error("expected one result set, got {count}")]
    MultipleResultSets {
        /// How many were produced.
        count: usize,
    },

    /// Row access beyond the visible rows.
    #[error("row {index} out of range (len {len})")]
    RowOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of visible rows.
        len: usize,
    },

    /// A joined column exists on both sides and cannot be disambiguated.
    #[error("ambiguous column `{column}`")]
    AmbiguousColumn {
        /// The column name.
        column: String,
    },

    /// A requested pivot value never occurs in the source rows.
    #[error("pivot value `{value}` not found")]
    PivotValueMissing {
        /// The missing value, rendered.
        value: String,
    },

    /// Feeding rows to this procedure needs key columns.
    #[error("{verb} by rows requires key columns")]
    KeyColumnsRequired {
        /// The verb.
        verb: Verb,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates an invalid skeleton error.
    pub fn invalid_skeleton(message: impl Into<String>) -> Self {
        Self::InvalidSkeleton {
            message: message.into(),
        }
    }

    /// Creates a malformed criteria error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCriteria {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a payload mismatch error.
    pub fn payload_mismatch(message: impl Into<String>) -> Self {
        Self::PayloadMismatch {
            message: message.into(),
        }
    }

    /// Creates an unknown column error.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    /// Creates an unsupported operator error.
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    /// The failure category.
    pub fn category(&self) -> ErrorCategory {
        match self.code() / 100 {
            1 => ErrorCategory::Compile,
            2 => ErrorCategory::Execution,
            3 => ErrorCategory::Coordination,
            4 => ErrorCategory::Model,
            _ => ErrorCategory::Codec,
        }
    }

    /// Stable numeric code.
    ///
    /// The hundreds digit is the category: 1 compile, 2 execution,
    /// 3 coordination, 4 model, 5 codec.
    pub fn code(&self) -> u16 {
        match self {
            Self::UnsupportedOperator { .. } => 101,
            Self::OperandArity { .. } => 102,
            Self::MissingKey { .. } => 103,
            Self::UnexpectedKey { .. } => 104,
            Self::InvalidSkeleton { .. } => 105,
            Self::InvalidIdentifier { .. } => 106,
            Self::MalformedCriteria { .. } => 107,
            Self::ParameterMismatch { .. } => 108,
            Self::InvalidPattern { .. } => 109,
            Self::Execution { .. } => 201,
            Self::TransactionControl { .. } => 202,
            Self::NoConnection { .. } => 301,
            Self::InvalidState { .. } => 302,
            Self::UnknownStep { .. } => 303,
            Self::DuplicateStep { .. } => 304,
            Self::PayloadMismatch { .. } => 305,
            Self::StepFailed { .. } => 306,
            Self::UserLogic { .. } => 307,
            Self::RollbackFailed { .. } => 308,
            Self::ProcedureUndefined { .. } => 401,
            Self::UnknownColumn { .. } => 402,
            Self::MultipleResultSets { .. } => 403,
            Self::RowOutOfRange { .. } => 404,
            Self::AmbiguousColumn { .. } => 405,
            Self::PivotValueMissing { .. } => 406,
            Self::KeyColumnsRequired { .. } => 407,
            Self::Codec(_) => 501,
        }
    }

    /// Whether a failed step originated in caller logic rather than the
    /// database.
    pub fn is_user_logic(&self) -> bool {
        match self {
            Self::UserLogic { .. } => true,
            Self::RollbackFailed { cause, .. } => cause.is_user_logic(),
            _ => false,
        }
    }

    /// The innermost quarry error behind step and rollback wrappers.
    pub fn root(&self) -> &CoreError {
        match self {
            Self::StepFailed { source, .. } => source.root(),
            Self::RollbackFailed { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// Renders the error as `config` asks.
    pub fn report(&self, config: &Config) -> String {
        self.render(config.error_detail)
    }

    /// Renders the error at the requested level of detail.
    pub fn render(&self, detail: ErrorDetail) -> String {
        match detail {
            ErrorDetail::Code => format!("E{}", self.code()),
            ErrorDetail::Message => format!("[E{}] {self}", self.code()),
            ErrorDetail::Full => {
                let mut out = format!("[E{}] {self}", self.code());
                if let Self::RollbackFailed { cause, .. } = self {
                    out.push_str(&format!("\n  triggered by: {}", cause.render(ErrorDetail::Full)));
                }
                let mut source = self.source();
                while let Some(err) = source {
                    out.push_str(&format!("\n  caused by: {err}"));
                    source = err.source();
                }
                out
            }
        }
    }
}
