//! # Workflow
//!
//! Orchestration of a generation run: the step state machine, the component
//! target queue, the coordinator that applies stage results, and batch runs.

pub mod batch;
pub mod coordinator;
pub mod events;
pub mod pipeline;
pub mod queue;

pub use batch::{run_batch, BatchResult, BatchRunner};
pub use coordinator::{Coordinator, RunOutcome};
pub use events::{WorkflowEvent, WorkflowEventKind};
pub use pipeline::{Pipeline, WorkflowStep};
pub use queue::{QueueStatus, TargetQueue};
