//! # Workflow Configuration
//!
//! Run settings, loaded from `.c4forge/config.json` when present.
//! API keys are read from the environment by the backend, never stored here.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{C4Error, Result};
use crate::state::io::get_home_path;

/// How the analysis field is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    /// One direct backend call per analysis
    Simple,
    /// A refinement team discusses each level, then a scribe consolidates
    #[default]
    Collaborative,
}

impl AnalysisStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStrategy::Simple => "simple",
            AnalysisStrategy::Collaborative => "collaborative",
        }
    }
}

impl fmt::Display for AnalysisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStrategy {
    type Err = C4Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "direct" => Ok(AnalysisStrategy::Simple),
            "collaborative" | "collab" | "team" => Ok(AnalysisStrategy::Collaborative),
            other => Err(C4Error::InvalidConfig(format!(
                "unknown strategy '{}' (expected simple or collaborative)",
                other
            ))),
        }
    }
}

/// Configuration for generation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Generation capability (model name)
    pub capability: String,
    /// Sampling temperature for built-on-demand backends
    pub temperature: f32,
    pub strategy: AnalysisStrategy,
    /// Discussion rounds per collaborative analysis
    pub collab_rounds: u32,
    /// Step budget per run
    pub max_steps: usize,
    /// Parallel runs in a batch
    pub max_concurrent_runs: usize,
    /// Where run artifacts are written
    pub results_dir: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            capability: "gemini-1.5-flash-latest".to_string(),
            temperature: 0.0,
            strategy: AnalysisStrategy::Collaborative,
            collab_rounds: 2,
            max_steps: 200,
            max_concurrent_runs: 2,
            results_dir: PathBuf::from("data/results"),
        }
    }
}

impl WorkflowConfig {
    /// Path of the config file (`<home>/config.json`)
    pub fn default_path() -> PathBuf {
        get_home_path().join("config.json")
    }

    /// Load from the default path; a missing file yields defaults
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_from(Self::default_path()).await
    }

    /// Load from `path`; a missing file yields defaults
    pub async fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if tokio::fs::metadata(path).await.is_err() {
            tracing::debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(C4Error::InvalidConfig(msg.to_string()));

        if self.capability.trim().is_empty() {
            return invalid("capability must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid("temperature must be within [0, 2]");
        }
        if self.collab_rounds == 0 {
            return invalid("collab_rounds must be at least 1");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1");
        }
        if self.max_concurrent_runs == 0 {
            return invalid("max_concurrent_runs must be at least 1");
        }
        Ok(())
    }
}
