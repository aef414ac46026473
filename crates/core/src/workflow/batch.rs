//! # Batch Runs
//!
//! Runs one independent workflow per brief, a bounded number at a time, and
//! writes each run's artifacts to `<results_dir>/<run_id>/`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::coordinator::Coordinator;
use super::events::WorkflowEvent;
use crate::backend::{BackendRegistry, GenerationBackend};
use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::state::checkpoint::Checkpointer;
use crate::state::io::save_artifacts;
use crate::state::model::C4Model;
use crate::state::run::RunState;

/// Result of one brief in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Brief name (file stem)
    pub name: String,
    pub run_id: String,
    /// Final model, partial when the run failed
    pub model: C4Model,
    pub steps_taken: usize,
    pub error: Option<String>,
    /// Where artifacts were written, if saving succeeded
    pub artifacts_dir: Option<PathBuf>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs briefs concurrently against one shared backend
pub struct BatchRunner {
    config: WorkflowConfig,
    backend: Arc<dyn GenerationBackend>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl BatchRunner {
    pub fn new(config: WorkflowConfig, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            checkpointer: None,
            event_tx: None,
        })
    }

    /// Resolve the configured capability from `registry`
    pub fn from_registry(config: WorkflowConfig, registry: &BackendRegistry) -> Result<Self> {
        let backend = registry.resolve(&config.capability, config.temperature)?;
        Self::new(config, backend)
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Forward events of every run to `tx`
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run every brief. Results come back in brief-name order; one failing
    /// run does not stop the others.
    #[tracing::instrument(skip_all, fields(briefs = briefs.len()))]
    pub async fn run(&self, briefs: BTreeMap<String, String>) -> Vec<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_runs));
        let mut set = JoinSet::new();

        for (index, (name, brief)) in briefs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let config = self.config.clone();
            let backend = self.backend.clone();
            let checkpointer = self.checkpointer.clone();
            let event_tx = self.event_tx.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result =
                    run_one(config, backend, checkpointer, event_tx, &name, &brief).await;
                (index, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                Err(e) => tracing::error!("Batch task panicked: {}", e),
            }
        }

        results.sort_by_key(|(index, _)| *index);
        let results: Vec<BatchResult> = results.into_iter().map(|(_, r)| r).collect();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(total = results.len(), failed, "Batch complete");
        results
    }
}

async fn run_one(
    config: WorkflowConfig,
    backend: Arc<dyn GenerationBackend>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
    name: &str,
    brief: &str,
) -> BatchResult {
    let results_dir = config.results_dir.clone();
    let state = RunState::for_brief(name, brief);
    let run_id = state.run_id.clone();

    let mut coordinator = match Coordinator::new(config, backend, state) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(brief = name, "Skipping brief: {}", e);
            return BatchResult {
                name: name.to_string(),
                run_id,
                model: C4Model::new(),
                steps_taken: 0,
                error: Some(e.to_string()),
                artifacts_dir: None,
            };
        }
    };
    if let Some(cp) = checkpointer {
        coordinator = coordinator.with_checkpointer(cp);
    }
    if let Some(tx) = event_tx {
        coordinator = coordinator.with_event_channel(tx);
    }

    tracing::info!(brief = name, run_id = %run_id, "Starting run");
    let error = coordinator.run().await.err().map(|e| e.to_string());
    let steps_taken = coordinator.steps_taken();
    let model = coordinator.state().model.clone();

    let dir = results_dir.join(&run_id);
    let artifacts_dir = match save_artifacts(&dir, &model).await {
        Ok(_) => Some(dir),
        Err(e) => {
            tracing::warn!(run_id = %run_id, "Failed to save artifacts: {:#}", e);
            None
        }
    };

    BatchResult {
        name: name.to_string(),
        run_id,
        model,
        steps_taken,
        error,
        artifacts_dir,
    }
}

/// Run `briefs` with a backend resolved from `registry`
pub async fn run_batch(
    config: WorkflowConfig,
    registry: &BackendRegistry,
    briefs: BTreeMap<String, String>,
) -> Result<Vec<BatchResult>> {
    let runner = BatchRunner::from_registry(config, registry)?;
    Ok(runner.run(briefs).await)
}
