//! # Diagram Skill
//!
//! Renders a structured definition (plus its analysis) as C4-PlantUML.

use super::prompts::{strip_code_fences, DIAGRAM, DIAGRAM_SYNTAX_GUIDE};
use super::{StageContext, StageOutcome};
use crate::backend::Prompt;
use crate::error::{C4Error, Result};
use crate::state::model::{Field, ModelUpdate, Slot};

/// Every diagram must open with this marker
pub const START_MARKER: &str = "@startuml";

pub struct DiagramSkill;

impl DiagramSkill {
    pub fn prompt(ctx: &StageContext<'_>, slot: &Slot) -> Prompt {
        Prompt::new(DIAGRAM)
            .bind("level", slot.describe_level())
            .bind("syntax_guide", DIAGRAM_SYNTAX_GUIDE)
            .bind(
                "structured_definition",
                ctx.own_field(slot, Field::StructuredDefinition).unwrap_or_default(),
            )
            .bind("analysis", ctx.own_field(slot, Field::Analysis).unwrap_or_default())
    }

    pub async fn run(ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let Some(slot) = ctx.hole_for(Field::Diagram) else {
            return Ok(StageOutcome::noop());
        };

        tracing::info!(slot = %slot, "Rendering diagram");
        let generated = ctx
            .backend
            .generate(&Self::prompt(ctx, &slot))
            .await
            .map_err(|e| C4Error::generation(&slot, e))?;
        let text = generated
            .into_text()
            .map_err(|e| C4Error::generation(&slot, e))?;

        let source = strip_code_fences(&text);
        if !source.starts_with(START_MARKER) {
            // Compilation is checked downstream
            tracing::warn!(slot = %slot, "Diagram does not start with {}", START_MARKER);
        }

        Ok(StageOutcome::update(ModelUpdate::new(slot, source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::{C4Model, Level};
    use crate::test_support::{complete_output, ScriptedBackend};
    use crate::workflow::queue::TargetQueue;

    #[tokio::test]
    async fn test_diagram_from_definition_and_analysis() {
        let backend = ScriptedBackend::new();
        let mut model = C4Model::new();
        let mut context = complete_output(Level::Context);
        context.diagram = None;
        model.context = context;
        let queue = TargetQueue::new();
        let ctx = StageContext::new("brief", &model, &queue, &backend);

        let update = DiagramSkill::run(&ctx).await.unwrap().update.unwrap();
        assert_eq!(update.slot, Slot::context(Field::Diagram));
        assert!(update.value.starts_with(START_MARKER));

        let call = &backend.calls()[0];
        assert_eq!(call.template, "diagram");
        assert!(call.bindings["syntax_guide"].contains("@startuml"));
        assert!(call.bindings["structured_definition"].contains("level: context"));
    }

    #[tokio::test]
    async fn test_noop_when_diagram_present() {
        let backend = ScriptedBackend::new();
        let mut model = C4Model::new();
        model.context = complete_output(Level::Context);
        let queue = TargetQueue::new();
        let ctx = StageContext::new("brief", &model, &queue, &backend);

        // next hole is the container analysis, not a diagram
        assert!(DiagramSkill::run(&ctx).await.unwrap().is_noop());
        assert!(backend.calls().is_empty());
    }
}
