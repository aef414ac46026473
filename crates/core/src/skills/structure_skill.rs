//! # Structure Skill
//!
//! Renders an analysis into the level's structured definition (YAML).
//!
//! The backend is asked for a schema-constrained object. Whatever comes back
//! is stored as YAML text; schema violations and unparseable text are logged
//! and kept, since the diagram stage can still work from imperfect input and
//! the target queue treats an unreadable container definition as empty.

use super::prompts::{strip_code_fences, STRUCTURE};
use super::{StageContext, StageOutcome};
use crate::backend::{Generated, Prompt};
use crate::error::{C4Error, Result};
use crate::state::model::{Field, Level, ModelUpdate, Slot};
use crate::state::schema::StructuredDefinition;

pub struct StructureSkill;

impl StructureSkill {
    pub fn prompt(ctx: &StageContext<'_>, slot: &Slot) -> Prompt {
        let analysis = ctx.own_field(slot, Field::Analysis).unwrap_or_default();

        let reference = ctx
            .model
            .parent_output(slot.level)
            .and_then(|output| output.structured_definition.as_deref());
        let context = match (slot.level.parent(), reference) {
            (Some(parent), Some(definition)) => format!(
                "**Reference: the {} level definition (for naming and style):**\n```yaml\n{}\n```",
                parent, definition
            ),
            _ => String::new(),
        };

        let mut template = StructuredDefinition::template(slot.level);
        if let Some(target) = &slot.target {
            template = template.replace("[Parent Container Name]", target);
        }

        Prompt::new(STRUCTURE)
            .bind("level", slot.level.as_str())
            .bind("analysis", analysis)
            .bind("context", context)
            .bind("template", template)
            .structured(slot.level)
    }

    pub async fn run(ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let Some(slot) = ctx.hole_for(Field::StructuredDefinition) else {
            return Ok(StageOutcome::noop());
        };

        tracing::info!(slot = %slot, "Rendering structured definition");
        let generated = ctx
            .backend
            .generate(&Self::prompt(ctx, &slot))
            .await
            .map_err(|e| C4Error::generation(&slot, e))?;

        let text = normalize(slot.level, generated).map_err(|e| C4Error::generation(&slot, e))?;
        check(slot.level, &slot, &text);

        Ok(StageOutcome::update(ModelUpdate::new(slot, text)))
    }
}

/// Convert a backend result into YAML text
fn normalize(level: Level, generated: Generated) -> anyhow::Result<String> {
    match generated {
        Generated::Structured(value) => {
            match serde_json::from_value::<StructuredDefinition>(value.clone()) {
                Ok(mut definition) => {
                    definition.level.get_or_insert(level);
                    definition.to_yaml()
                }
                Err(e) => {
                    tracing::warn!(level = %level, "Structured output does not match the schema: {}", e);
                    Ok(serde_yaml::to_string(&value)?)
                }
            }
        }
        Generated::Text(text) => Ok(strip_code_fences(&text)),
    }
}

/// Log (but keep) definitions that fail to parse or validate
fn check(level: Level, slot: &Slot, text: &str) {
    match StructuredDefinition::parse(level, text) {
        Ok(definition) => {
            for violation in definition.validate(level) {
                tracing::warn!(slot = %slot, "Structured definition: {}", violation);
            }
        }
        Err(e) => tracing::warn!(slot = %slot, "{}", e),
    }
}
