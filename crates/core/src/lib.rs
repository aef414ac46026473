//! # C4Forge Core
//!
//! Generates a three-level C4 architecture model (system context,
//! containers, components) from a free-text system brief, one field at a
//! time: analysis, then a structured definition, then a PlantUML diagram.
//!
//! ## Architecture
//!
//! - `backend/` - Generation backends (radkit-backed LLM functions) and their registry
//! - `skills/` - Prompt templates, personas and the per-field generation stages
//! - `state/` - The C4 model, structured definitions, artifacts and checkpoints
//! - `workflow/` - Step routing, the target queue, the run coordinator and batches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use c4forge_core::backend::BackendRegistry;
//! use c4forge_core::config::WorkflowConfig;
//! use c4forge_core::workflow::Coordinator;
//!
//! let config = WorkflowConfig::load().await?;
//! let mut coordinator =
//!     Coordinator::for_brief(config, &BackendRegistry::new(), "hotel", "A hotel booking system")?;
//! let outcome = coordinator.run().await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod skills;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AnalysisStrategy, WorkflowConfig};
pub use error::{C4Error, Result};
pub use state::{C4Model, Level, LevelOutput};
pub use workflow::{Coordinator, RunOutcome};
