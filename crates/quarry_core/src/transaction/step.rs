//! Plan steps, iterations, and what interstitial logic gets to see.

use crate::error::BoxError;
use crate::procedure::{Output, Payload, Procedure};
use indexmap::IndexMap;
use quarry_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Caller logic run between database steps.
///
/// It sees the previous step's record and may rewrite the next step's
/// payload. Returning an error aborts the step as user-logic failure.
pub type Interstitial = Arc<dyn Fn(&mut Interlude<'_>) -> Result<(), BoxError> + Send + Sync>;

/// What a step does.
#[derive(Clone)]
pub enum StepKind {
    /// Runs a procedure.
    Procedure(Procedure),
    /// Runs caller logic.
    Interstitial(Interstitial),
}

impl fmt::Debug for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Procedure(procedure) => f.debug_tuple("Procedure").field(procedure).finish(),
            StepKind::Interstitial(_) => f.write_str("Interstitial(..)"),
        }
    }
}

/// A named entry in a transaction plan.
#[derive(Debug, Clone)]
pub struct Step {
    pub(crate) name: String,
    pub(crate) kind: StepKind,
}

impl Step {
    /// The step name, unique within its plan.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the step does.
    #[must_use]
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }
}

/// One replay's worth of payloads, keyed by step name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Iteration {
    payloads: IndexMap<String, Payload>,
}

impl Iteration {
    /// An iteration that supplies nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a payload for `step`, builder style.
    #[must_use]
    pub fn with(mut self, step: impl Into<String>, payload: impl Into<Payload>) -> Self {
        self.insert(step, payload);
        self
    }

    /// Sets the payload for `step`.
    pub fn insert(&mut self, step: impl Into<String>, payload: impl Into<Payload>) {
        self.payloads.insert(step.into(), payload.into());
    }

    /// The payload for `step`.
    #[must_use]
    pub fn get(&self, step: &str) -> Option<&Payload> {
        self.payloads.get(step)
    }

    pub(crate) fn take(&mut self, step: &str) -> Option<Payload> {
        self.payloads.shift_remove(step)
    }

    /// Step names this iteration addresses.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }

    /// Whether no payloads are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// What one executed step left behind.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Step name.
    pub name: String,
    /// Payload the step ran with.
    pub payload: Option<Payload>,
    /// Results, for procedures that produce rows.
    pub output: Option<Output>,
    /// Identifiers the connection reported.
    pub affected: Vec<Value>,
}

/// The step after an interstitial, with its pending payload.
#[derive(Debug)]
pub struct NextStep<'a> {
    /// Step name.
    pub name: &'a str,
    /// Payload it will run with; may be replaced or cleared.
    pub payload: &'a mut Option<Payload>,
}

/// The view an [`Interstitial`] gets of its neighbours.
#[derive(Debug)]
pub struct Interlude<'a> {
    /// Index of the running iteration.
    pub iteration: usize,
    /// Record of the step just before, if any.
    pub previous: Option<&'a StepRecord>,
    /// The step just after, if any.
    pub next: Option<NextStep<'a>>,
}
