//! # Quarry Connection
//!
//! The connection capability consumed by the quarry engine.
//!
//! Per-engine adapters live outside this workspace. The engine only needs
//! something that can prepare SQL, execute it with named parameters, and
//! manage transaction boundaries and savepoints.
//!
//! ## Design Principles
//!
//! - Connections are opaque: no knowledge of which database backs them
//! - Shared as `Arc<dyn Connection>`, so every method takes `&self`
//! - Identity (not equality) decides whether two handles are one participant
//!
//! ## Available Implementations
//!
//! - [`InMemoryConnection`] - A state-plus-handler fake with real
//!   transaction and savepoint snapshots, for tests and demos

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod memory;

pub use connection::{same_connection, Connection, Outcome, Params, Prepared};
pub use error::{ConnectionError, ConnectionResult};
pub use memory::{Executed, InMemoryConnection, Session};
