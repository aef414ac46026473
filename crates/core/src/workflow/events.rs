//! # Workflow Events
//!
//! Progress events emitted by a run, for logs, UIs and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::model::{Level, Slot};
use crate::state::run::rand_u32;

/// Kind of workflow event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    RunStarted,
    /// A workflow step is about to execute
    StepStarted,
    /// A model field was written
    FieldGenerated,
    /// One team member spoke
    TeamTurn,
    /// A team discussion was consolidated into an analysis
    TeamConsolidated,
    /// The component target queue was built
    QueuePopulated,
    /// A component target finished all three fields
    TargetCompleted,
    RunCompleted,
    RunFailed,
}

/// An event in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Unique event ID
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: WorkflowEventKind,
    pub run_id: String,
    #[serde(default)]
    pub level: Option<Level>,
    /// Component target (container name), if any
    #[serde(default)]
    pub target: Option<String>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind, run_id: &str) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            kind,
            run_id: run_id.to_string(),
            level: None,
            target: None,
            data: None,
        }
    }

    /// Attach the level and target of a slot
    pub fn at(mut self, slot: &Slot) -> Self {
        self.level = Some(slot.level);
        self.target = slot.target.clone();
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

fn event_id() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("{:x}-{:x}", nanos, rand_u32())
}
