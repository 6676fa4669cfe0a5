//! Statements, skeleton compilation, and statement groups.

mod compiler;
mod group;
mod placeholders;
mod shape;
mod single;

pub use compiler::{
    compile, CompiledStatement, Skeleton, COLUMNS_MARKER, CONDITION_MARKER, VALUES_MARKER,
};
pub use group::StatementGroup;
pub use placeholders::{sanitize, scan as scan_placeholders, validate_identifier};
pub use shape::ShapeKey;
pub use single::Statement;
