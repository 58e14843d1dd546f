//! Workflow engine - runs a directed graph of named steps over a per-run context.

pub mod executor;
pub mod step;

pub use executor::{ExecutionError, GraphError, Workflow, WorkflowBuilder};
pub use step::{END, Slot, Step, StepError, Transition};
