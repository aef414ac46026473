//! # C4 Model
//!
//! The accumulating work product of a run: one [`LevelOutput`] for the
//! context level, one for the container level, and one per container at the
//! component level.
//!
//! Fields are written at most once and strictly left to right
//! (analysis → structured definition → diagram), and levels strictly in order
//! (context → container → component). [`C4Model::apply`] enforces both.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{C4Error, Result};

/// One of the three fixed abstraction levels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, LLMOutput,
)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Level 1: the system, its users and external systems
    Context,
    /// Level 2: deployable units inside the system
    Container,
    /// Level 3: components inside one container
    Component,
}

impl Level {
    /// All levels in generation order
    pub fn all() -> [Level; 3] {
        [Level::Context, Level::Container, Level::Component]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Context => "context",
            Level::Container => "container",
            Level::Component => "component",
        }
    }

    /// C4 level number (1-3)
    pub fn number(&self) -> u8 {
        match self {
            Level::Context => 1,
            Level::Container => 2,
            Level::Component => 3,
        }
    }

    /// The level this one decomposes
    pub fn parent(&self) -> Option<Level> {
        match self {
            Level::Context => None,
            Level::Container => Some(Level::Context),
            Level::Component => Some(Level::Container),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field of a [`LevelOutput`], in population order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Analysis,
    StructuredDefinition,
    Diagram,
}

impl Field {
    /// Fields in the order they must be populated
    pub const ORDER: [Field; 3] = [Field::Analysis, Field::StructuredDefinition, Field::Diagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Analysis => "analysis",
            Field::StructuredDefinition => "structured_definition",
            Field::Diagram => "diagram",
        }
    }

    /// The field that must be present before this one may be written
    pub fn previous(&self) -> Option<Field> {
        match self {
            Field::Analysis => None,
            Field::StructuredDefinition => Some(Field::Analysis),
            Field::Diagram => Some(Field::StructuredDefinition),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a single field in the model: (level, target, field)
///
/// `target` is the container name and is only set at the component level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub field: Field,
}

impl Slot {
    pub fn context(field: Field) -> Self {
        Self {
            level: Level::Context,
            target: None,
            field,
        }
    }

    pub fn container(field: Field) -> Self {
        Self {
            level: Level::Container,
            target: None,
            field,
        }
    }

    pub fn component(target: impl Into<String>, field: Field) -> Self {
        Self {
            level: Level::Component,
            target: Some(target.into()),
            field,
        }
    }

    /// Human-readable level description, e.g. `component 'Booking API'`
    pub fn describe_level(&self) -> String {
        match &self.target {
            Some(target) => format!("{} '{}'", self.level, target),
            None => self.level.to_string(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.describe_level(), self.field)
    }
}

/// Artifacts for a single level (or a single container at the component level)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOutput {
    /// Free-text analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// YAML text following the level's `StructuredDefinition` schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_definition: Option<String>,
    /// C4-PlantUML source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
}

impl LevelOutput {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Analysis => self.analysis.as_deref(),
            Field::StructuredDefinition => self.structured_definition.as_deref(),
            Field::Diagram => self.diagram.as_deref(),
        }
    }

    /// Whether generation for this level has begun
    pub fn is_started(&self) -> bool {
        self.analysis.is_some()
    }

    /// Whether all three fields are present
    pub fn is_complete(&self) -> bool {
        self.diagram.is_some()
    }

    /// The first absent field, in population order
    pub fn next_field(&self) -> Option<Field> {
        Field::ORDER.into_iter().find(|f| self.get(*f).is_none())
    }

    /// No field is present while an earlier one is absent
    pub fn is_well_ordered(&self) -> bool {
        Field::ORDER.into_iter().all(|f| match f.previous() {
            Some(prev) => self.get(f).is_none() || self.get(prev).is_some(),
            None => true,
        })
    }

    fn set(&mut self, field: Field, value: String) -> std::result::Result<(), String> {
        if self.get(field).is_some() {
            return Err(format!("{} is already set", field));
        }
        if let Some(prev) = field.previous() {
            if self.get(prev).is_none() {
                return Err(format!("{} must be written before {}", prev, field));
            }
        }
        match field {
            Field::Analysis => self.analysis = Some(value),
            Field::StructuredDefinition => self.structured_definition = Some(value),
            Field::Diagram => self.diagram = Some(value),
        }
        Ok(())
    }
}

/// A single field write produced by a pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUpdate {
    pub slot: Slot,
    pub value: String,
}

impl ModelUpdate {
    pub fn new(slot: Slot, value: impl Into<String>) -> Self {
        Self {
            slot,
            value: value.into(),
        }
    }
}

/// The complete C4 model across levels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct C4Model {
    #[serde(default)]
    pub context: LevelOutput,
    #[serde(default)]
    pub containers: LevelOutput,
    /// Component-level outputs keyed by container name
    #[serde(default)]
    pub components: BTreeMap<String, LevelOutput>,
}

impl C4Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the output for a level (and container, at the component level)
    pub fn output(&self, level: Level, target: Option<&str>) -> Option<&LevelOutput> {
        match level {
            Level::Context => Some(&self.context),
            Level::Container => Some(&self.containers),
            Level::Component => target.and_then(|t| self.components.get(t)),
        }
    }

    /// Value stored at a slot, if any
    pub fn get(&self, slot: &Slot) -> Option<&str> {
        self.output(slot.level, slot.target.as_deref())
            .and_then(|o| o.get(slot.field))
    }

    /// The output one level up from `slot`'s level
    pub fn parent_output(&self, level: Level) -> Option<&LevelOutput> {
        match level.parent()? {
            Level::Context => Some(&self.context),
            Level::Container => Some(&self.containers),
            Level::Component => None,
        }
    }

    /// Find the single next incomplete field.
    ///
    /// Walks context, then containers, then the current component target
    /// (the front of the target queue) and returns the first absent field.
    /// `None` means nothing is left to generate for the current position.
    pub fn next_hole(&self, current_target: Option<&str>) -> Option<Slot> {
        if let Some(field) = self.context.next_field() {
            return Some(Slot::context(field));
        }
        if let Some(field) = self.containers.next_field() {
            return Some(Slot::container(field));
        }
        let target = current_target?;
        let field = match self.components.get(target) {
            Some(output) => output.next_field()?,
            None => Field::Analysis,
        };
        Some(Slot::component(target, field))
    }

    /// Apply a stage's update, enforcing monotonicity and both orderings
    pub fn apply(&mut self, update: ModelUpdate) -> Result<()> {
        let ModelUpdate { slot, value } = update;
        let reject = |reason: String| C4Error::InvalidUpdate {
            slot: slot.clone(),
            reason,
        };

        let output = match slot.level {
            Level::Context => &mut self.context,
            Level::Container => {
                if !self.context.is_complete() {
                    return Err(reject("context level is not complete".to_string()));
                }
                &mut self.containers
            }
            Level::Component => {
                if !self.containers.is_complete() {
                    return Err(reject("container level is not complete".to_string()));
                }
                let target = slot
                    .target
                    .clone()
                    .ok_or_else(|| reject("component update without a target".to_string()))?;
                self.components.entry(target).or_default()
            }
        };

        output.set(slot.field, value).map_err(reject)
    }

    /// Every level output satisfies the field ordering
    pub fn is_well_ordered(&self) -> bool {
        self.context.is_well_ordered()
            && self.containers.is_well_ordered()
            && self.components.values().all(LevelOutput::is_well_ordered)
    }

    /// Number of component targets with all three fields present
    pub fn completed_components(&self) -> usize {
        self.components.values().filter(|o| o.is_complete()).count()
    }
}
