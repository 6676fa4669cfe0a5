//! # Quarry Testkit
//!
//! Test utilities for quarry.
//!
//! This crate provides:
//! - A single-table fake database that interprets compiled statements
//! - Ready-made models bound to that fake
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use quarry_testkit::prelude::*;
//!
//! let conn = table_connection("people", "id", people());
//! let mut model = table_model("people", &conn).unwrap();
//! model.select(false).unwrap();
//! assert_eq!(model.len(), 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
