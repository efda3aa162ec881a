//! Workflow engine: user-authored pipelines of AI steps.
//!
//! A [`Workflow`] is an ordered list of typed [`Step`]s. The
//! [`WorkflowEngine`] runs them one at a time, feeding each step's output
//! into the next, and reports a [`StepProgress`] for every transition.
//! Steps touch the outside world only through the [`ExecutionContext`]
//! they are handed: the entity store, the agent loop and the run's
//! cancellation token.

pub mod context;
pub mod engine;
pub mod model;
pub mod progress;
pub mod steps;

pub use context::{ExecutionContext, Scope, StepError};
pub use engine::WorkflowEngine;
pub use model::{Step, StepKind, Workflow};
pub use progress::{RunStatus, StepProgress, StepStatus, WorkflowRun};
pub use steps::execute_step;
