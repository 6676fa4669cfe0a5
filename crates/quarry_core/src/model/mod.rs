//! In-memory models bound to remote procedures.
//!
//! A [`Model`] holds rows fetched by a select procedure, applies local
//! filters and sorts, computes [`Diff`](crate::Diff)s against fresh
//! selects, and writes changes back through insert, update, and delete
//! procedures. [`join`](Model::join) and [`pivot`](Model::pivot) derive
//! new detached models.

mod dataset;
mod join;
mod pivot;
mod sort;

pub use dataset::{Changes, Model};
pub use join::{JoinKind, JoinOn};
pub use pivot::Pivot;
pub use sort::{SortDirection, SortKey};
