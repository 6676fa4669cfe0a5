//! Transaction coordination.
//!
//! A [`Transaction`] runs a plan of [`Procedure`](crate::Procedure) and
//! interstitial steps inside one transaction per participant connection,
//! isolating each step with a savepoint and replaying the plan once per
//! [`Iteration`].

mod coordinator;
mod state;
mod step;

pub use coordinator::Transaction;
pub use state::TransactionState;
pub use step::{Interlude, Interstitial, Iteration, NextStep, Step, StepKind, StepRecord};
