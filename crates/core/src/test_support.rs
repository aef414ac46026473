//! Deterministic offline backend for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::backend::{GenerationBackend, Generated, Prompt, ResponseFormat};
use crate::state::model::{Level, LevelOutput};
use crate::state::schema::{Element, ElementKind, NamedScope, Relationship, StructuredDefinition};

/// One recorded backend call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub template: &'static str,
    pub bindings: BTreeMap<String, String>,
    pub format: ResponseFormat,
}

/// Answers every template with canned, well-formed output and records calls
pub struct ScriptedBackend {
    calls: Mutex<Vec<RecordedCall>>,
    containers: Vec<String>,
    malformed: Option<Level>,
    raw_containers: Option<String>,
    failures: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            containers: vec!["Web App".to_string(), "Booking API".to_string()],
            malformed: None,
            raw_containers: None,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Container names the container-level definition will contain
    pub fn with_containers(mut self, names: &[&str]) -> Self {
        self.containers = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Return unparseable text for structured requests at `level`
    pub fn malformed_at(mut self, level: Level) -> Self {
        self.malformed = Some(level);
        self
    }

    /// Answer the container-level structured request with this text verbatim
    pub fn with_raw_container_definition(mut self, text: &str) -> Self {
        self.raw_containers = Some(text.to_string());
        self
    }

    /// Fail the first `times` calls to `template`
    pub fn failing_on(self, template: &'static str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(template, times);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, template: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.template == template)
            .count()
    }

    fn should_fail(&self, template: &'static str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(template) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<Generated> {
        let template = prompt.name();
        self.calls.lock().unwrap().push(RecordedCall {
            template,
            bindings: prompt.bindings.clone(),
            format: prompt.format,
        });

        if self.should_fail(template) {
            anyhow::bail!("scripted failure for '{}'", template);
        }

        let binding = |name: &str| prompt.binding(name).unwrap_or_default().to_string();
        let generated = match (template, prompt.format) {
            ("structure", ResponseFormat::Structured(level)) if self.malformed == Some(level) => {
                Generated::Text("elements: [unclosed".to_string())
            }
            ("structure", ResponseFormat::Structured(Level::Container))
                if self.raw_containers.is_some() =>
            {
                Generated::Text(self.raw_containers.clone().unwrap_or_default())
            }
            ("structure", ResponseFormat::Structured(level)) => Generated::Structured(
                serde_json::to_value(definition(level, &self.containers))?,
            ),
            ("analysis", _) => Generated::Text(format!(
                "{} analysis (target: {})",
                binding("level"),
                binding("component_target")
            )),
            ("team_member", _) => Generated::Text(format!("{} says hello", binding("role"))),
            ("report_generator", _) => Generated::Text(format!(
                "Consolidated report for {}",
                binding("level_description")
            )),
            ("diagram", _) => Generated::Text(format!(
                "```plantuml\n@startuml\ntitle {}\n@enduml\n```",
                binding("level")
            )),
            (other, _) => anyhow::bail!("no script for template '{}'", other),
        };
        Ok(generated)
    }
}

fn element(kind: ElementKind, name: &str) -> Element {
    Element {
        kind,
        name: name.to_string(),
        description: format!("{} description", name),
        technology: None,
    }
}

/// A valid definition for `level`
pub fn definition(level: Level, containers: &[String]) -> StructuredDefinition {
    let system = Some(NamedScope {
        name: "Booking System".to_string(),
        description: None,
    });
    let uses = |source: &str, destination: &str| Relationship {
        source: source.to_string(),
        destination: destination.to_string(),
        description: "Uses".to_string(),
        technology: None,
    };

    match level {
        Level::Context => StructuredDefinition {
            level: Some(level),
            scope: "System Context diagram for Booking System".to_string(),
            system,
            parent_container: None,
            elements: vec![
                element(ElementKind::Person, "Guest"),
                element(ElementKind::Person, "Staff"),
                element(ElementKind::ExternalSystem, "Payment Gateway"),
            ],
            relationships: vec![
                uses("Guest", "Booking System"),
                uses("Booking System", "Payment Gateway"),
            ],
        },
        Level::Container => {
            let mut elements = vec![
                element(ElementKind::Person, "Guest"),
                element(ElementKind::ExternalSystem, "Payment Gateway"),
            ];
            elements.extend(containers.iter().map(|c| element(ElementKind::Container, c)));
            StructuredDefinition {
                level: Some(level),
                scope: "Container diagram for Booking System".to_string(),
                system,
                parent_container: None,
                elements,
                relationships: vec![],
            }
        }
        Level::Component => StructuredDefinition {
            level: Some(level),
            scope: "Component diagram".to_string(),
            system: None,
            parent_container: Some(NamedScope {
                name: "Container".to_string(),
                description: None,
            }),
            elements: vec![
                element(ElementKind::Component, "Controller"),
                element(ElementKind::Component, "Service"),
            ],
            relationships: vec![uses("Controller", "Service")],
        },
    }
}

/// A fully populated output for `level` (containers "Web App", "Booking API")
pub fn complete_output(level: Level) -> LevelOutput {
    let containers = vec!["Web App".to_string(), "Booking API".to_string()];
    LevelOutput {
        analysis: Some(format!("{} analysis", level)),
        structured_definition: Some(definition(level, &containers).to_yaml().unwrap()),
        diagram: Some("@startuml\n@enduml".to_string()),
    }
}
