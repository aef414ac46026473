//! # Workflow Steps
//!
//! The generation state machine. Which level and target a stage works on is
//! never tracked here; stages re-derive it from the model. This module only
//! decides which step runs next.
//!
//! ```text
//! RunAnalysis -> RunStructuredRender -> RunDiagramRender --(post-diagram)--+
//!      ^                                                                  |
//!      |   context done, containers not started  <------------------------+
//!      |   containers done, queue uninitialized  -> PopulateQueue --+     |
//!      |   otherwise                             -> CompleteTarget -+     |
//!      +---------------------- has work <------------ (queue status) -+
//!                              done     -> Terminate
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::model::C4Model;
use crate::workflow::queue::{QueueStatus, TargetQueue};

/// A state of the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    RunAnalysis,
    RunStructuredRender,
    RunDiagramRender,
    PopulateQueue,
    CompleteTarget,
    Terminate,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::RunAnalysis => "run-analysis",
            WorkflowStep::RunStructuredRender => "run-structured-render",
            WorkflowStep::RunDiagramRender => "run-diagram-render",
            WorkflowStep::PopulateQueue => "populate-queue",
            WorkflowStep::CompleteTarget => "complete-target",
            WorkflowStep::Terminate => "terminate",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == WorkflowStep::Terminate
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing after a diagram has been rendered.
///
/// Relies on levels being generated strictly in order: a complete context
/// with unstarted containers can only mean the context diagram just finished.
pub fn route_after_diagram(model: &C4Model, queue: &TargetQueue) -> WorkflowStep {
    if model.context.is_complete() && !model.containers.is_started() {
        WorkflowStep::RunAnalysis
    } else if model.containers.is_complete() && !queue.is_initialized() {
        WorkflowStep::PopulateQueue
    } else {
        WorkflowStep::CompleteTarget
    }
}

/// Routing after the queue was populated or a target was completed
pub fn route_on_queue(queue: &TargetQueue) -> WorkflowStep {
    match queue.status() {
        QueueStatus::HasWork => WorkflowStep::RunAnalysis,
        QueueStatus::Done => WorkflowStep::Terminate,
    }
}

/// The step that follows `step`, given the state after it was applied
pub fn next_step(step: WorkflowStep, model: &C4Model, queue: &TargetQueue) -> WorkflowStep {
    match step {
        WorkflowStep::RunAnalysis => WorkflowStep::RunStructuredRender,
        WorkflowStep::RunStructuredRender => WorkflowStep::RunDiagramRender,
        WorkflowStep::RunDiagramRender => route_after_diagram(model, queue),
        WorkflowStep::PopulateQueue | WorkflowStep::CompleteTarget => route_on_queue(queue),
        WorkflowStep::Terminate => WorkflowStep::Terminate,
    }
}

/// The pipeline state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Step to execute next
    pub step: WorkflowStep,
    /// Steps executed so far
    pub steps_taken: usize,
    /// Steps allowed before the run is aborted
    pub max_steps: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            step: WorkflowStep::RunAnalysis,
            steps_taken: 0,
            max_steps: 200,
        }
    }
}

impl Pipeline {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            ..Self::default()
        }
    }

    /// Continue from a saved step
    pub fn resume_at(step: WorkflowStep, max_steps: usize) -> Self {
        Self {
            step,
            steps_taken: 0,
            max_steps,
        }
    }

    /// Move past the current step
    pub fn advance(&mut self, model: &C4Model, queue: &TargetQueue) {
        self.step = next_step(self.step, model, queue);
        self.steps_taken += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.step.is_terminal()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.steps_taken >= self.max_steps
    }
}
