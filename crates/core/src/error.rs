//! # Errors
//!
//! Failure taxonomy for a generation run. Stage failures always carry the
//! [`Slot`] (level, target, field) they were working on, so a caller can
//! resume or diagnose from the partially populated model.

use crate::state::model::{Level, Slot};

/// Boxed source error for backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the C4 generation core
#[derive(Debug, thiserror::Error)]
pub enum C4Error {
    /// No backend is registered (or derivable) for the requested capability
    #[error("generation capability '{name}' is not available")]
    UnavailableCapability { name: String },

    /// Structured-definition text could not be parsed where it was required
    #[error("malformed structured definition at {level} level: {reason}")]
    MalformedStructuredData { level: Level, reason: String },

    /// The backend call itself failed; never retried by the core
    #[error("generation failed at {slot}: {source}")]
    GenerationFailure {
        slot: Slot,
        #[source]
        source: BoxError,
    },

    /// A model update would overwrite a field or break the field order
    #[error("rejected update to {slot}: {reason}")]
    InvalidUpdate { slot: Slot, reason: String },

    /// The workflow did not reach `terminate` within the configured step budget
    #[error("workflow exceeded the step limit of {limit}")]
    StepLimitExceeded { limit: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[source] BoxError),
}

impl C4Error {
    /// Wrap a backend error with the slot that was being generated
    pub fn generation(slot: &Slot, err: anyhow::Error) -> Self {
        C4Error::GenerationFailure {
            slot: slot.clone(),
            source: err.into(),
        }
    }

    /// The slot this error is attributed to, if any
    pub fn slot(&self) -> Option<&Slot> {
        match self {
            C4Error::GenerationFailure { slot, .. } | C4Error::InvalidUpdate { slot, .. } => {
                Some(slot)
            }
            _ => None,
        }
    }
}

pub type Result<T, E = C4Error> = std::result::Result<T, E>;
