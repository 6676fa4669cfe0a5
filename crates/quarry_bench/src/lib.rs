//! Shared helpers for the quarry benchmarks.

pub mod utils;
