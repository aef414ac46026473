//! # Generation Backend
//!
//! Uniform call contract around a named text-generation capability.
//!
//! A [`Prompt`] names a bundled template, carries its variable bindings and
//! states whether free text or a schema-constrained definition is expected.
//! The [`BackendRegistry`] maps capability names to backends; unknown names
//! fail with [`C4Error::UnavailableCapability`]. Backends never retry.

pub mod radkit_backend;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{C4Error, Result};
use crate::models::ModelConfig;
use crate::skills::prompts::{self, PromptTemplate};
use crate::state::model::Level;

pub use radkit_backend::{RadkitBackend, TextReply};

/// Expected shape of a generation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "level")]
pub enum ResponseFormat {
    Text,
    /// An object conforming to the level's `StructuredDefinition` schema
    Structured(Level),
}

/// A rendered request: named template + bindings + expected format
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub template: PromptTemplate,
    pub bindings: BTreeMap<String, String>,
    pub format: ResponseFormat,
}

impl Prompt {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            bindings: BTreeMap::new(),
            format: ResponseFormat::Text,
        }
    }

    /// Bind a `{name}` placeholder
    pub fn bind(mut self, name: &str, value: impl Into<String>) -> Self {
        self.bindings.insert(name.to_string(), value.into());
        self
    }

    pub fn structured(mut self, level: Level) -> Self {
        self.format = ResponseFormat::Structured(level);
        self
    }

    pub fn name(&self) -> &'static str {
        self.template.name
    }

    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// System instructions with bindings substituted
    pub fn system_text(&self) -> String {
        prompts::render(self.template.system, &self.bindings)
    }

    /// Message body with bindings substituted
    pub fn user_text(&self) -> String {
        prompts::render(self.template.body, &self.bindings)
    }
}

/// Result of a generation call
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Text(String),
    Structured(serde_json::Value),
}

impl Generated {
    /// Text form of the result; structured values are rendered as YAML
    pub fn into_text(self) -> anyhow::Result<String> {
        match self {
            Generated::Text(text) => Ok(text),
            Generated::Structured(value) => Ok(serde_yaml::to_string(&value)?),
        }
    }
}

/// A generation capability
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Capability name, for logs
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<Generated>;
}

/// Name → backend lookup
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn GenerationBackend>>,
    radkit_fallback: bool,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("radkit_fallback", &self.radkit_fallback)
            .finish()
    }
}

impl BackendRegistry {
    /// Registry that builds radkit backends for any resolvable model name
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            radkit_fallback: true,
        }
    }

    /// Registry that only serves explicitly registered backends
    pub fn explicit_only() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn GenerationBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn with_backend(mut self, name: impl Into<String>, backend: Arc<dyn GenerationBackend>) -> Self {
        self.register(name, backend);
        self
    }

    /// Resolve a capability by name.
    ///
    /// Registered backends keep their own sampling settings; `temperature`
    /// applies to backends built on demand.
    pub fn resolve(&self, name: &str, temperature: f32) -> Result<Arc<dyn GenerationBackend>> {
        if let Some(backend) = self.backends.get(name) {
            return Ok(backend.clone());
        }

        if self.radkit_fallback {
            if let Some(config) = ModelConfig::for_capability(name) {
                tracing::debug!(
                    capability = name,
                    provider = config.provider.display_name(),
                    "Building radkit backend"
                );
                return Ok(Arc::new(RadkitBackend::new(
                    config.with_temperature(temperature),
                )));
            }
        }

        Err(C4Error::UnavailableCapability {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::prompts::ANALYSIS;

    struct Echo;

    #[async_trait]
    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &Prompt) -> anyhow::Result<Generated> {
            Ok(Generated::Text(prompt.user_text()))
        }
    }

    #[test]
    fn test_prompt_rendering() {
        let prompt = Prompt::new(ANALYSIS)
            .bind("level", "context")
            .bind("brief", "A booking system");

        assert_eq!(prompt.name(), "analysis");
        assert_eq!(prompt.format, ResponseFormat::Text);
        assert!(prompt.user_text().contains("A booking system"));
        assert_eq!(prompt.binding("level"), Some("context"));
    }

    #[tokio::test]
    async fn test_registered_backend_resolves() {
        let registry = BackendRegistry::explicit_only().with_backend("echo", Arc::new(Echo));
        let backend = registry.resolve("echo", 0.0).unwrap();

        let out = backend
            .generate(&Prompt::new(ANALYSIS).bind("brief", "hello"))
            .await
            .unwrap();
        assert!(out.into_text().unwrap().contains("hello"));
    }

    #[test]
    fn test_unknown_capability_is_unavailable() {
        let registry = BackendRegistry::explicit_only();
        let err = registry.resolve("gpt-4o", 0.0).err().unwrap();
        assert!(matches!(err, C4Error::UnavailableCapability { ref name } if name == "gpt-4o"));

        let registry = BackendRegistry::new();
        assert!(registry.resolve("gpt-4o", 0.2).is_ok());
        assert!(matches!(
            registry.resolve("local-llama", 0.0),
            Err(C4Error::UnavailableCapability { .. })
        ));
    }

    #[test]
    fn test_registered_backend_shadows_fallback() {
        let registry = BackendRegistry::new().with_backend("gpt-4o", Arc::new(Echo));
        let backend = registry.resolve("gpt-4o", 0.0).unwrap();
        assert_eq!(backend.name(), "echo");

        let out = tokio_test::block_on(backend.generate(&Prompt::new(ANALYSIS))).unwrap();
        assert!(matches!(out, Generated::Text(_)));
    }

    #[test]
    fn test_structured_value_into_text() {
        let value = serde_json::json!({"level": "context", "elements": []});
        let text = Generated::Structured(value).into_text().unwrap();
        assert!(text.contains("level: context"));
    }
}
