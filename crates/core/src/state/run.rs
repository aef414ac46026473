//! # Run State
//!
//! Everything a single generation run owns: its id, the brief, the model
//! being built and the component target queue.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::io::sanitize_filename;
use super::model::C4Model;
use crate::workflow::queue::TargetQueue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub brief: String,
    #[serde(default)]
    pub model: C4Model,
    #[serde(default)]
    pub queue: TargetQueue,
}

impl RunState {
    /// Fresh state: empty model, uninitialized queue
    pub fn new(run_id: impl Into<String>, brief: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            brief: brief.into(),
            model: C4Model::new(),
            queue: TargetQueue::new(),
        }
    }

    /// Fresh state with a generated run id
    pub fn for_brief(name: &str, brief: impl Into<String>) -> Self {
        Self::new(new_run_id(name), brief)
    }
}

/// `<YYYYmmdd-HHMMSS>-<slug>-<8 hex>`
pub fn new_run_id(name: &str) -> String {
    let slug = sanitize_filename(name);
    let slug = if slug.is_empty() { "run".to_string() } else { slug };
    format!(
        "{}-{}-{:08x}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        slug,
        rand_u32()
    )
}

/// Simple random number (not cryptographic)
pub(crate) fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}
