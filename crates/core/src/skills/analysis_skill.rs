//! # Analysis Skill
//!
//! Direct, single-pass textual analysis of the next level (or container).

use super::prompts::ANALYSIS;
use super::{StageContext, StageOutcome, NOT_APPLICABLE};
use crate::backend::Prompt;
use crate::error::{C4Error, Result};
use crate::state::model::{Field, ModelUpdate, Slot};

/// Produces `analysis` with one backend call
pub struct AnalysisSkill;

impl AnalysisSkill {
    /// Prompt for the analysis at `slot`, given the brief and the parent analysis
    pub fn prompt(ctx: &StageContext<'_>, slot: &Slot) -> Prompt {
        let context = match slot.level.parent() {
            Some(parent) => format!(
                "**Context from the {} level analysis:**\n```\n{}\n```",
                parent,
                ctx.parent_field(slot, Field::Analysis)
            ),
            None => String::new(),
        };

        Prompt::new(ANALYSIS)
            .bind("level", slot.level.as_str())
            .bind("brief", ctx.brief)
            .bind("context", context)
            .bind(
                "component_target",
                slot.target.as_deref().unwrap_or(NOT_APPLICABLE),
            )
    }

    pub async fn run(ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let Some(slot) = ctx.hole_for(Field::Analysis) else {
            return Ok(StageOutcome::noop());
        };

        tracing::info!(slot = %slot, "Running analysis");
        let generated = ctx
            .backend
            .generate(&Self::prompt(ctx, &slot))
            .await
            .map_err(|e| C4Error::generation(&slot, e))?;
        let text = generated
            .into_text()
            .map_err(|e| C4Error::generation(&slot, e))?;

        Ok(StageOutcome::update(ModelUpdate::new(slot, text.trim())))
    }
}
