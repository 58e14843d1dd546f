//! Step contract for the workflow executor.

use std::fmt;

use futures::future::BoxFuture;

/// Successor name a step declares when it may finish the run.
pub const END: &str = "End";

/// What a step decided after running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Continue with the named step.
    Next(&'static str),
    /// Stop the run with this payload.
    Finish(String),
}

/// A single node of the graph.
///
/// `successors` is the static contract checked both when the graph is built
/// and on every transition at run time.
pub trait Step<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn successors(&self) -> &'static [&'static str];

    fn run<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<Transition, StepError>>;
}

/// Failure raised inside a step body.
#[derive(Debug, Clone, PartialEq)]
pub enum StepError {
    /// A context field the step depends on was never written.
    MissingInput(&'static str),
    /// A write-once slot was written a second time.
    SlotAlreadyFilled(&'static str),
    /// An external capability failed with no local fallback.
    Capability { name: &'static str, message: String },
}

impl StepError {
    pub fn capability(name: &'static str, err: impl fmt::Display) -> Self {
        StepError::Capability { name, message: err.to_string() }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::MissingInput(field) => write!(f, "missing context input '{field}'"),
            StepError::SlotAlreadyFilled(slot) => write!(f, "slot '{slot}' written twice"),
            StepError::Capability { name, message } => write!(f, "{name} failed: {message}"),
        }
    }
}

impl std::error::Error for StepError {}

/// A context field that may be written exactly once.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }

    pub fn fill(&mut self, value: T) -> Result<(), StepError> {
        if self.value.is_some() {
            return Err(StepError::SlotAlreadyFilled(self.name));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_filled(&self) -> bool {
        self.value.is_some()
    }

    /// Read the value or fail the step with `MissingInput`.
    pub fn require(&self) -> Result<&T, StepError> {
        self.value.as_ref().ok_or(StepError::MissingInput(self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_fills_once() {
        let mut slot = Slot::new("weather");
        assert!(!slot.is_filled());
        slot.fill(3).unwrap();
        assert_eq!(slot.get(), Some(&3));
        assert_eq!(slot.fill(4), Err(StepError::SlotAlreadyFilled("weather")));
        assert_eq!(slot.get(), Some(&3));
    }

    #[test]
    fn test_require_reports_slot_name() {
        let slot: Slot<String> = Slot::new("fitness");
        assert_eq!(slot.require(), Err(StepError::MissingInput("fitness")));
    }
}
