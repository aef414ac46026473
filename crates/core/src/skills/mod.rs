//! # Generation Skills
//!
//! The per-level pipeline stages and the collaborative analysis team.
//!
//! ## Architecture
//!
//! ```text
//! Coordinator
//!   └── Stage (AnalysisSkill | CollaborativeAnalysisSkill, StructureSkill, DiagramSkill)
//!         └── GenerationBackend (prompt template + bindings)
//! ```
//!
//! Every stage finds the model's single next hole and only acts when that
//! hole is its own field. Otherwise it returns no update, which makes every
//! stage safe to call unconditionally.

pub mod prompts;
pub mod personas;

pub mod analysis_skill;
pub mod diagram_skill;
pub mod structure_skill;
pub mod team_skill;

pub use analysis_skill::AnalysisSkill;
pub use diagram_skill::DiagramSkill;
pub use personas::{Role, Roster};
pub use structure_skill::StructureSkill;
pub use team_skill::{CollaborativeAnalysisSkill, RefinementTeam, TeamOutcome};

use crate::backend::GenerationBackend;
use crate::state::model::{C4Model, Field, ModelUpdate, Slot};
use crate::workflow::queue::TargetQueue;

/// Placeholder value for context that does not exist (e.g. the context level's parent)
pub const NOT_APPLICABLE: &str = "N/A";

/// Read-only view a stage works from
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub brief: &'a str,
    pub model: &'a C4Model,
    pub queue: &'a TargetQueue,
    pub backend: &'a dyn GenerationBackend,
}

impl<'a> StageContext<'a> {
    pub fn new(
        brief: &'a str,
        model: &'a C4Model,
        queue: &'a TargetQueue,
        backend: &'a dyn GenerationBackend,
    ) -> Self {
        Self {
            brief,
            model,
            queue,
            backend,
        }
    }

    /// The model's next hole, if it is `field`
    pub fn hole_for(&self, field: Field) -> Option<Slot> {
        self.model
            .next_hole(self.queue.current())
            .filter(|slot| slot.field == field)
    }

    /// A field of the level one above `slot`, or `N/A`
    pub fn parent_field(&self, slot: &Slot, field: Field) -> String {
        self.model
            .parent_output(slot.level)
            .and_then(|output| output.get(field))
            .unwrap_or(NOT_APPLICABLE)
            .to_string()
    }

    /// A field already present at `slot`'s own level
    pub fn own_field(&self, slot: &Slot, field: Field) -> Option<&'a str> {
        self.model
            .output(slot.level, slot.target.as_deref())
            .and_then(|output| output.get(field))
    }
}

/// What a stage produced in one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// The single field write, or `None` when the stage had nothing to do
    pub update: Option<ModelUpdate>,
    /// Set when the analysis came out of a team discussion
    pub team: Option<TeamOutcome>,
}

impl StageOutcome {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn update(update: ModelUpdate) -> Self {
        Self {
            update: Some(update),
            team: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.update.is_none()
    }
}
