//! # Coordinator
//!
//! Drives one run through the workflow state machine. The coordinator is the
//! only owner of the run's [`RunState`]: stages read it through a
//! [`StageContext`] and return updates, the coordinator applies them, routes
//! to the next step and checkpoints.
//!
//! A failing step leaves the model untouched and the pipeline parked on that
//! step, so [`Coordinator::resume`] re-issues only the failed field.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::{WorkflowEvent, WorkflowEventKind};
use super::pipeline::{Pipeline, WorkflowStep};
use crate::backend::{BackendRegistry, GenerationBackend};
use crate::config::{AnalysisStrategy, WorkflowConfig};
use crate::error::{C4Error, Result};
use crate::skills::{
    AnalysisSkill, CollaborativeAnalysisSkill, DiagramSkill, StageContext, StageOutcome,
    StructureSkill,
};
use crate::state::checkpoint::{Checkpoint, Checkpointer};
use crate::state::model::C4Model;
use crate::state::run::RunState;

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub model: C4Model,
    pub final_step: WorkflowStep,
    pub steps_taken: usize,
    /// Targets still queued (zero after a normal termination)
    pub remaining_targets: usize,
    pub events: Vec<WorkflowEvent>,
}

/// Orchestrates a single generation run
pub struct Coordinator {
    config: WorkflowConfig,
    backend: Arc<dyn GenerationBackend>,
    state: RunState,
    pipeline: Pipeline,
    events: Vec<WorkflowEvent>,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Coordinator {
    /// Start a fresh run from `state`
    pub fn new(
        config: WorkflowConfig,
        backend: Arc<dyn GenerationBackend>,
        state: RunState,
    ) -> Result<Self> {
        config.validate()?;
        if state.brief.trim().is_empty() {
            return Err(C4Error::InvalidConfig("brief must not be empty".to_string()));
        }

        let pipeline = Pipeline::new(config.max_steps);
        Ok(Self {
            config,
            backend,
            state,
            pipeline,
            events: Vec::new(),
            event_tx: None,
            checkpointer: None,
        })
    }

    /// Start a fresh run for a named brief, resolving the configured capability
    pub fn for_brief(
        config: WorkflowConfig,
        registry: &BackendRegistry,
        name: &str,
        brief: &str,
    ) -> Result<Self> {
        let backend = registry.resolve(&config.capability, config.temperature)?;
        Self::new(config, backend, RunState::for_brief(name, brief))
    }

    /// Continue a run from its last checkpoint
    pub fn resume(
        config: WorkflowConfig,
        backend: Arc<dyn GenerationBackend>,
        checkpoint: Checkpoint,
    ) -> Result<Self> {
        let mut coordinator = Self::new(config, backend, checkpoint.state)?;
        coordinator.pipeline = Pipeline::resume_at(checkpoint.step, coordinator.config.max_steps);
        tracing::info!(
            run_id = %coordinator.state.run_id,
            step = %checkpoint.step,
            "Resuming run"
        );
        Ok(coordinator)
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Save a checkpoint after every step
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }

    /// The step that will execute next
    pub fn step(&self) -> WorkflowStep {
        self.pipeline.step
    }

    /// Steps executed since the run started (or resumed)
    pub fn steps_taken(&self) -> usize {
        self.pipeline.steps_taken
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    async fn emit(&mut self, event: WorkflowEvent) {
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    fn event(&self, kind: WorkflowEventKind) -> WorkflowEvent {
        WorkflowEvent::new(kind, &self.state.run_id)
    }

    fn checkpoint(&self) -> Result<()> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(());
        };
        checkpointer
            .save(&Checkpoint::new(self.pipeline.step, self.state.clone()))
            .map_err(|e| C4Error::Checkpoint(e.into()))
    }

    /// Run the current stage against a read-only view of the state
    async fn run_stage(&self, step: WorkflowStep) -> Result<StageOutcome> {
        let ctx = StageContext::new(
            &self.state.brief,
            &self.state.model,
            &self.state.queue,
            self.backend.as_ref(),
        );

        match step {
            WorkflowStep::RunAnalysis => match self.config.strategy {
                AnalysisStrategy::Simple => AnalysisSkill::run(&ctx).await,
                AnalysisStrategy::Collaborative => {
                    CollaborativeAnalysisSkill::new(self.config.collab_rounds)
                        .run(&ctx)
                        .await
                }
            },
            WorkflowStep::RunStructuredRender => StructureSkill::run(&ctx).await,
            WorkflowStep::RunDiagramRender => DiagramSkill::run(&ctx).await,
            _ => Ok(StageOutcome::noop()),
        }
    }

    async fn apply(&mut self, outcome: StageOutcome) -> Result<()> {
        if let Some(team) = &outcome.team {
            let slot = outcome.update.as_ref().map(|u| u.slot.clone());
            for (turn, role) in team.speakers.iter().enumerate() {
                let mut event = self.event(WorkflowEventKind::TeamTurn).with_data(
                    serde_json::json!({ "turn": turn + 1, "role": role.display_name() }),
                );
                if let Some(slot) = &slot {
                    event = event.at(slot);
                }
                self.emit(event).await;
            }

            let mut event = self.event(WorkflowEventKind::TeamConsolidated).with_data(
                serde_json::json!({ "turns": team.turns(), "rounds": team.rounds }),
            );
            if let Some(slot) = &slot {
                event = event.at(slot);
            }
            self.emit(event).await;
        }

        let Some(update) = outcome.update else {
            tracing::debug!(step = %self.pipeline.step, "Stage had nothing to do");
            return Ok(());
        };

        let slot = update.slot.clone();
        let chars = update.value.len();
        self.state.model.apply(update)?;
        tracing::info!(slot = %slot, chars, "Field generated");

        let event = self
            .event(WorkflowEventKind::FieldGenerated)
            .at(&slot)
            .with_data(serde_json::json!({ "field": slot.field, "chars": chars }));
        self.emit(event).await;
        Ok(())
    }

    /// Execute the current step, route, and checkpoint. Returns the next step.
    pub async fn step_once(&mut self) -> Result<WorkflowStep> {
        let step = self.pipeline.step;
        if step.is_terminal() {
            return Ok(step);
        }
        if self.pipeline.budget_exhausted() {
            return Err(C4Error::StepLimitExceeded {
                limit: self.pipeline.max_steps,
            });
        }

        let event = self
            .event(WorkflowEventKind::StepStarted)
            .with_data(serde_json::json!({ "step": step }));
        self.emit(event).await;

        match step {
            WorkflowStep::RunAnalysis
            | WorkflowStep::RunStructuredRender
            | WorkflowStep::RunDiagramRender => {
                let outcome = self.run_stage(step).await?;
                self.apply(outcome).await?;
            }
            WorkflowStep::PopulateQueue => {
                let definition = self
                    .state
                    .model
                    .containers
                    .structured_definition
                    .clone()
                    .unwrap_or_default();
                let count = self.state.queue.populate(&definition);
                let targets: Vec<String> =
                    self.state.queue.remaining().map(str::to_string).collect();

                let event = self
                    .event(WorkflowEventKind::QueuePopulated)
                    .with_data(serde_json::json!({ "count": count, "targets": targets }));
                self.emit(event).await;
            }
            WorkflowStep::CompleteTarget => {
                if let Some(target) = self.state.queue.complete_current() {
                    let event = self
                        .event(WorkflowEventKind::TargetCompleted)
                        .with_target(&target)
                        .with_data(serde_json::json!({ "remaining": self.state.queue.len() }));
                    self.emit(event).await;
                }
            }
            WorkflowStep::Terminate => {}
        }

        self.pipeline.advance(&self.state.model, &self.state.queue);
        tracing::debug!(from = %step, to = %self.pipeline.step, "Step complete");
        self.checkpoint()?;
        Ok(self.pipeline.step)
    }

    /// Run to `terminate`.
    ///
    /// On error the partially populated model stays available through
    /// [`Coordinator::state`] and the last checkpoint.
    #[tracing::instrument(skip(self), fields(run_id = %self.state.run_id, strategy = %self.config.strategy))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let event = self.event(WorkflowEventKind::RunStarted).with_data(serde_json::json!({
            "step": self.pipeline.step,
            "capability": self.config.capability,
            "strategy": self.config.strategy,
        }));
        self.emit(event).await;
        self.checkpoint()?;

        while !self.pipeline.is_complete() {
            if let Err(e) = self.step_once().await {
                tracing::error!(step = %self.pipeline.step, "Run failed: {}", e);
                let event = self.event(WorkflowEventKind::RunFailed).with_data(serde_json::json!({
                    "step": self.pipeline.step,
                    "error": e.to_string(),
                }));
                self.emit(event).await;
                return Err(e);
            }
        }

        let event = self.event(WorkflowEventKind::RunCompleted).with_data(serde_json::json!({
            "steps": self.pipeline.steps_taken,
            "components": self.state.model.completed_components(),
        }));
        self.emit(event).await;
        tracing::info!(
            steps = self.pipeline.steps_taken,
            components = self.state.model.completed_components(),
            "Run complete"
        );

        Ok(RunOutcome {
            run_id: self.state.run_id.clone(),
            model: self.state.model.clone(),
            final_step: self.pipeline.step,
            steps_taken: self.pipeline.steps_taken,
            remaining_targets: self.state.queue.len(),
            events: self.events.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::checkpoint::InMemoryCheckpointer;
    use crate::state::model::{Field, Level, Slot};
    use crate::state::schema::StructuredDefinition;
    use crate::test_support::ScriptedBackend;

    const BOOKING_BRIEF: &str = "A two-role booking system with one external payment gateway";

    fn simple_config() -> WorkflowConfig {
        WorkflowConfig {
            strategy: AnalysisStrategy::Simple,
            ..Default::default()
        }
    }

    fn coordinator(config: WorkflowConfig, backend: Arc<ScriptedBackend>) -> Coordinator {
        Coordinator::new(config, backend, RunState::new("test-run", BOOKING_BRIEF)).unwrap()
    }

    fn kinds(events: &[WorkflowEvent], kind: WorkflowEventKind) -> Vec<&WorkflowEvent> {
        events.iter().filter(|e| e.kind == kind).collect()
    }

    #[tokio::test]
    async fn test_booking_brief_end_to_end() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut coordinator = coordinator(simple_config(), backend.clone());

        let outcome = coordinator.run().await.unwrap();
        let model = &outcome.model;

        assert_eq!(outcome.final_step, WorkflowStep::Terminate);
        assert_eq!(outcome.remaining_targets, 0);
        assert!(coordinator.state().queue.is_initialized());
        assert!(model.context.is_complete());
        assert!(model.containers.is_complete());
        assert!(model.is_well_ordered());

        let containers = StructuredDefinition::parse(
            Level::Container,
            model.containers.structured_definition.as_deref().unwrap(),
        )
        .unwrap()
        .container_names();
        assert!(!containers.is_empty());
        for name in &containers {
            assert!(model.components[name].is_complete(), "{name} incomplete");
        }

        // Context fields populate left to right
        let context_fields: Vec<Field> = outcome
            .events
            .iter()
            .filter(|e| e.kind == WorkflowEventKind::FieldGenerated)
            .filter(|e| e.level == Some(Level::Context))
            .map(|e| serde_json::from_value(e.data.as_ref().unwrap()["field"].clone()).unwrap())
            .collect();
        assert_eq!(context_fields, Field::ORDER.to_vec());

        // 7 steps for context/container/populate, 4 per target
        assert_eq!(outcome.steps_taken, 7 + 4 * containers.len());
        assert_eq!(backend.count("analysis"), 2 + containers.len());
    }

    #[tokio::test]
    async fn test_malformed_container_definition_terminates_cleanly() {
        let backend = Arc::new(ScriptedBackend::new().malformed_at(Level::Container));
        let mut coordinator = coordinator(simple_config(), backend.clone());

        let outcome = coordinator.run().await.unwrap();

        assert_eq!(outcome.final_step, WorkflowStep::Terminate);
        assert!(coordinator.state().queue.is_initialized());
        assert!(coordinator.state().queue.is_empty());
        assert!(outcome.model.containers.is_complete());
        assert!(outcome.model.components.is_empty());
        assert!(kinds(&outcome.events, WorkflowEventKind::TargetCompleted).is_empty());
    }

    #[tokio::test]
    async fn test_exactly_k_target_cycles() {
        let pools: [&[&str]; 3] = [&[], &["API"], &["Web", "API", "Worker"]];
        for names in pools {
            let backend = Arc::new(ScriptedBackend::new().with_containers(names));
            let mut coordinator = coordinator(simple_config(), backend.clone());
            let outcome = coordinator.run().await.unwrap();

            let completed: Vec<_> = kinds(&outcome.events, WorkflowEventKind::TargetCompleted)
                .iter()
                .map(|e| e.target.clone().unwrap())
                .collect();
            assert_eq!(completed, names.to_vec(), "K={}", names.len());
            assert_eq!(outcome.model.completed_components(), names.len());
            assert_eq!(backend.count("analysis"), 2 + names.len());
        }
    }

    #[tokio::test]
    async fn test_off_schema_container_elements_keep_targets() {
        let definition = r#"
level: Container
elements:
  - type: person
    name: Guest
  - type: container
    name: Web App
  - type: containerDb
    name: Bookings DB
  - type: container
    name: Booking API
"#;
        let backend = Arc::new(ScriptedBackend::new().with_raw_container_definition(definition));
        let mut coordinator = coordinator(simple_config(), backend.clone());

        let outcome = coordinator.run().await.unwrap();

        let completed: Vec<_> = kinds(&outcome.events, WorkflowEventKind::TargetCompleted)
            .iter()
            .map(|e| e.target.clone().unwrap())
            .collect();
        assert_eq!(completed, vec!["Web App", "Booking API"]);
        assert_eq!(outcome.model.completed_components(), 2);
    }

    #[tokio::test]
    async fn test_collaborative_run_counts_turns() {
        let backend = Arc::new(ScriptedBackend::new().with_containers(&[]));
        let mut coordinator = coordinator(WorkflowConfig::default(), backend.clone());

        let outcome = coordinator.run().await.unwrap();

        // context roster 3 x 2 rounds, container roster 4 x 2 rounds
        assert_eq!(backend.count("team_member"), 6 + 8);
        assert_eq!(backend.count("report_generator"), 2);
        assert_eq!(backend.count("analysis"), 0);
        assert_eq!(kinds(&outcome.events, WorkflowEventKind::TeamTurn).len(), 14);

        let consolidated = kinds(&outcome.events, WorkflowEventKind::TeamConsolidated);
        assert_eq!(consolidated.len(), 2);
        assert_eq!(consolidated[0].data.as_ref().unwrap()["turns"], 6);
        assert_eq!(
            outcome.model.context.analysis.as_deref(),
            Some("Consolidated report for context")
        );
    }

    #[tokio::test]
    async fn test_resume_after_generation_failure() {
        let backend = Arc::new(ScriptedBackend::new().failing_on("diagram", 1));
        let checkpoints = Arc::new(InMemoryCheckpointer::new());
        let mut first = coordinator(simple_config(), backend.clone())
            .with_checkpointer(checkpoints.clone());

        let err = first.run().await.unwrap_err();
        assert_eq!(err.slot(), Some(&Slot::context(Field::Diagram)));
        assert!(first.state().model.context.structured_definition.is_some());
        assert!(first.state().model.context.diagram.is_none());
        assert_eq!(first.steps_taken(), 2);
        assert_eq!(
            kinds(first.events(), WorkflowEventKind::RunFailed).len(),
            1
        );

        let checkpoint = checkpoints.load("test-run").unwrap().unwrap();
        assert_eq!(checkpoint.step, WorkflowStep::RunDiagramRender);

        let mut resumed = Coordinator::resume(simple_config(), backend.clone(), checkpoint)
            .unwrap()
            .with_checkpointer(checkpoints.clone());
        let outcome = resumed.run().await.unwrap();

        assert_eq!(outcome.final_step, WorkflowStep::Terminate);
        assert_eq!(outcome.model.completed_components(), 2);
        // the context analysis and definition were not regenerated
        assert_eq!(backend.count("analysis"), 2 + 2);
        assert_eq!(backend.count("structure"), 2 + 2);
        assert_eq!(
            checkpoints.load("test-run").unwrap().unwrap().step,
            WorkflowStep::Terminate
        );
    }

    #[tokio::test]
    async fn test_step_limit() {
        let backend = Arc::new(ScriptedBackend::new());
        let config = WorkflowConfig {
            max_steps: 5,
            ..simple_config()
        };
        let mut coordinator = coordinator(config, backend);

        let err = coordinator.run().await.unwrap_err();
        assert!(matches!(err, C4Error::StepLimitExceeded { limit: 5 }));
    }

    #[tokio::test]
    async fn test_event_channel_streams_events() {
        let backend = Arc::new(ScriptedBackend::new().with_containers(&[]));
        let (tx, mut rx) = mpsc::channel(256);
        let mut coordinator = coordinator(simple_config(), backend).with_event_channel(tx);

        let outcome = coordinator.run().await.unwrap();
        drop(coordinator);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.kind);
        }
        assert_eq!(received.first(), Some(&WorkflowEventKind::RunStarted));
        assert_eq!(received.last(), Some(&WorkflowEventKind::RunCompleted));
        assert_eq!(received.len(), outcome.events.len());
    }

    #[tokio::test]
    async fn test_terminated_run_is_inert() {
        let backend = Arc::new(ScriptedBackend::new().with_containers(&[]));
        let mut coordinator = coordinator(simple_config(), backend.clone());
        coordinator.run().await.unwrap();
        let calls = backend.calls().len();

        assert_eq!(coordinator.step_once().await.unwrap(), WorkflowStep::Terminate);
        assert_eq!(backend.calls().len(), calls);
    }

    #[test]
    fn test_unknown_capability_fails_fast() {
        let config = WorkflowConfig {
            capability: "local-llama".to_string(),
            ..Default::default()
        };
        let result = Coordinator::for_brief(config, &BackendRegistry::new(), "b", BOOKING_BRIEF);
        assert!(matches!(result, Err(C4Error::UnavailableCapability { .. })));
    }

    #[test]
    fn test_empty_brief_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = Coordinator::new(simple_config(), backend, RunState::new("r", "  "));
        assert!(matches!(result, Err(C4Error::InvalidConfig(_))));
    }
}
