//! # Structured Definition Schema
//!
//! The machine-readable intermediate representation between a level's
//! free-text analysis and its diagram. The same types are used to
//! prompt the backend (as a JSON schema and as a rendered YAML template)
//! and to validate what comes back.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::model::Level;
use crate::error::{C4Error, Result};
use crate::skills::prompts::strip_code_fences;

/// Type discriminator for an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub enum ElementKind {
    #[serde(rename = "person")]
    Person,
    #[serde(
        rename = "externalSystem",
        alias = "external_system",
        alias = "external-unit"
    )]
    ExternalSystem,
    #[serde(rename = "container", alias = "unit")]
    Container,
    #[serde(rename = "component", alias = "sub-unit")]
    Component,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Person => "person",
            ElementKind::ExternalSystem => "externalSystem",
            ElementKind::Container => "container",
            ElementKind::Component => "component",
        }
    }

    /// Kinds permitted in a definition for `level`
    pub fn allowed_at(level: Level) -> &'static [ElementKind] {
        match level {
            Level::Context => &[ElementKind::Person, ElementKind::ExternalSystem],
            Level::Container => &[
                ElementKind::Person,
                ElementKind::ExternalSystem,
                ElementKind::Container,
            ],
            Level::Component => &[ElementKind::Component],
        }
    }
}

/// A named scope: the system (levels 1-2) or the parent container (level 3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct NamedScope {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A person, external system, container or component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
}

/// A directed interaction between two named elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Relationship {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
}

/// Structured definition for one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default)]
    pub scope: String,
    /// The system being modelled (context and container levels)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<NamedScope>,
    /// The container being decomposed (component level)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_container: Option<NamedScope>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl StructuredDefinition {
    /// Parse YAML (or JSON) text, tolerating surrounding markdown fences
    pub fn parse(level: Level, text: &str) -> Result<Self> {
        let body = strip_code_fences(text);
        if body.trim().is_empty() {
            return Err(C4Error::MalformedStructuredData {
                level,
                reason: "definition is empty".to_string(),
            });
        }
        serde_yaml::from_str(&body).map_err(|e| C4Error::MalformedStructuredData {
            level,
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Container names read leniently from raw definition text.
    ///
    /// Only `elements[*].type` and `elements[*].name` are consulted, so elements
    /// of unknown kinds, a differently cased `level` tag or unnamed entries do
    /// not hide the containers next to them. Fails only when the text is not
    /// a YAML mapping.
    pub fn scan_container_names(text: &str) -> Result<Vec<String>> {
        let malformed = |reason: String| C4Error::MalformedStructuredData {
            level: Level::Container,
            reason,
        };

        let body = strip_code_fences(text);
        let document: serde_yaml::Value =
            serde_yaml::from_str(&body).map_err(|e| malformed(e.to_string()))?;
        if !document.is_mapping() {
            return Err(malformed("definition is not a mapping".to_string()));
        }

        let Some(elements) = document.get("elements").and_then(|e| e.as_sequence()) else {
            return Ok(Vec::new());
        };

        let names = elements
            .iter()
            .filter(|element| {
                element
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| matches!(t.trim().to_lowercase().as_str(), "container" | "unit"))
                    .unwrap_or(false)
            })
            .filter_map(|element| element.get("name").and_then(|n| n.as_str()))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(names)
    }

    /// Names of `container` elements in discovery order
    pub fn container_names(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| e.kind == ElementKind::Container)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Schema violations for a definition produced at `level`
    pub fn validate(&self, level: Level) -> Vec<String> {
        let mut violations = Vec::new();

        match self.level {
            Some(declared) if declared != level => violations.push(format!(
                "declares level '{}' but was generated for '{}'",
                declared, level
            )),
            None => violations.push("missing 'level' field".to_string()),
            _ => {}
        }

        let allowed = ElementKind::allowed_at(level);
        for element in &self.elements {
            if !allowed.contains(&element.kind) {
                violations.push(format!(
                    "element '{}' has type '{}', not permitted at the {} level",
                    element.name,
                    element.kind.as_str(),
                    level
                ));
            }
        }

        match level {
            Level::Component if self.parent_container.is_none() => {
                violations.push("missing 'parentContainer'".to_string())
            }
            Level::Context | Level::Container if self.system.is_none() => {
                violations.push("missing 'system'".to_string())
            }
            _ => {}
        }

        let mut known: HashSet<&str> = self.elements.iter().map(|e| e.name.as_str()).collect();
        if let Some(system) = &self.system {
            known.insert(system.name.as_str());
        }
        if let Some(parent) = &self.parent_container {
            known.insert(parent.name.as_str());
        }
        for rel in &self.relationships {
            for end in [&rel.source, &rel.destination] {
                if !known.contains(end.as_str()) {
                    violations.push(format!("relationship references unknown element '{}'", end));
                }
            }
        }

        violations
    }

    /// Example document for `level`, used as the output template in prompts
    pub fn example(level: Level) -> Self {
        let person = Element {
            kind: ElementKind::Person,
            name: "[User Role A]".to_string(),
            description: "[Who this user is and what they want.]".to_string(),
            technology: None,
        };
        let external = Element {
            kind: ElementKind::ExternalSystem,
            name: "[External System A]".to_string(),
            description: "[What the external system does.]".to_string(),
            technology: None,
        };
        let system = NamedScope {
            name: "[System Name]".to_string(),
            description: Some("[Purpose and value of the system.]".to_string()),
        };

        match level {
            Level::Context => Self {
                level: Some(Level::Context),
                scope: "System Context diagram for [System Name]".to_string(),
                system: Some(system),
                parent_container: None,
                elements: vec![person, external],
                relationships: vec![Relationship {
                    source: "[User Role A]".to_string(),
                    destination: "[System Name]".to_string(),
                    description: "[Nature of the interaction]".to_string(),
                    technology: Some("[e.g., HTTPS]".to_string()),
                }],
            },
            Level::Container => Self {
                level: Some(Level::Container),
                scope: "Container diagram for [System Name]".to_string(),
                system: Some(NamedScope {
                    description: None,
                    ..system
                }),
                parent_container: None,
                elements: vec![
                    person,
                    external,
                    Element {
                        kind: ElementKind::Container,
                        name: "[Container A, e.g., Web Application]".to_string(),
                        description: "[Responsibility of this container.]".to_string(),
                        technology: Some("[e.g., React]".to_string()),
                    },
                ],
                relationships: vec![Relationship {
                    source: "[User Role A]".to_string(),
                    destination: "[Container A, e.g., Web Application]".to_string(),
                    description: "[e.g., Uses]".to_string(),
                    technology: Some("[e.g., HTTPS]".to_string()),
                }],
            },
            Level::Component => Self {
                level: Some(Level::Component),
                scope: "Component diagram for the [Parent Container Name] container".to_string(),
                system: None,
                parent_container: Some(NamedScope {
                    name: "[Parent Container Name]".to_string(),
                    description: None,
                }),
                elements: vec![
                    Element {
                        kind: ElementKind::Component,
                        name: "[Component A, e.g., Order Controller]".to_string(),
                        description: "[Responsibility of this component.]".to_string(),
                        technology: Some("[e.g., Axum handler]".to_string()),
                    },
                    Element {
                        kind: ElementKind::Component,
                        name: "[Component B, e.g., Order Service]".to_string(),
                        description: "[Responsibility of this component.]".to_string(),
                        technology: None,
                    },
                ],
                relationships: vec![Relationship {
                    source: "[Component A, e.g., Order Controller]".to_string(),
                    destination: "[Component B, e.g., Order Service]".to_string(),
                    description: "[e.g., Invokes]".to_string(),
                    technology: None,
                }],
            },
        }
    }

    /// Rendered YAML template for `level`
    pub fn template(level: Level) -> String {
        let header = format!(
            "# C4 Model: Level {} - {}\n",
            level.number(),
            match level {
                Level::Context => "System Context",
                Level::Container => "Container",
                Level::Component => "Component",
            }
        );
        let body = serde_yaml::to_string(&Self::example(level)).unwrap_or_default();
        header + &body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER_YAML: &str = r#"
level: container
scope: "Container diagram for Booking"
system:
  name: "Booking"
elements:
  - type: "person"
    name: "Customer"
    description: "Books appointments"
  - type: "externalSystem"
    name: "Payment Gateway"
  - type: "container"
    name: "Web App"
    technology: "React"
  - type: "container"
    name: "Booking API"
    technology: "Rust"
relationships:
  - source: "Customer"
    destination: "Web App"
    description: "Uses"
  - source: "Booking API"
    destination: "Payment Gateway"
    description: "Charges cards"
"#;

    #[test]
    fn test_parse_container_definition() {
        let def = StructuredDefinition::parse(Level::Container, CONTAINER_YAML).unwrap();
        assert_eq!(def.level, Some(Level::Container));
        assert_eq!(def.elements.len(), 4);
        assert_eq!(def.container_names(), vec!["Web App", "Booking API"]);
        assert!(def.validate(Level::Container).is_empty());
    }

    #[test]
    fn test_parse_strips_fences() {
        let fenced = format!("```yaml\n{}\n```", CONTAINER_YAML.trim());
        let def = StructuredDefinition::parse(Level::Container, &fenced).unwrap();
        assert_eq!(def.container_names().len(), 2);
    }

    #[test]
    fn test_parse_accepts_generic_kind_aliases() {
        let yaml = "level: container\nelements:\n  - type: unit\n    name: Worker\n  - type: external-unit\n    name: Bank\n";
        let def = StructuredDefinition::parse(Level::Container, yaml).unwrap();
        assert_eq!(def.elements[0].kind, ElementKind::Container);
        assert_eq!(def.elements[1].kind, ElementKind::ExternalSystem);
    }

    #[test]
    fn test_scan_container_names_skips_unfit_elements() {
        let yaml = r#"
```yaml
level: CONTAINER
elements:
  - type: person
    name: Guest
  - type: containerDb
    name: Store
  - type: container
    name: API
  - name: Orphan
```
"#;
        assert!(StructuredDefinition::parse(Level::Container, yaml).is_err());
        assert_eq!(
            StructuredDefinition::scan_container_names(yaml).unwrap(),
            vec!["API".to_string()]
        );
        assert!(StructuredDefinition::scan_container_names("elements: [unclosed").is_err());
        assert_eq!(
            StructuredDefinition::scan_container_names("level: container").unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_parse_malformed() {
        let err = StructuredDefinition::parse(Level::Container, "elements: [unclosed").unwrap_err();
        assert!(matches!(
            err,
            C4Error::MalformedStructuredData {
                level: Level::Container,
                ..
            }
        ));

        assert!(StructuredDefinition::parse(Level::Container, "   ").is_err());
        assert!(StructuredDefinition::parse(Level::Container, "just some prose").is_err());
    }

    #[test]
    fn test_validate_flags_disallowed_kinds_and_dangling_relationships() {
        let yaml = r#"
level: context
system:
  name: Booking
elements:
  - type: container
    name: API
relationships:
  - source: Ghost
    destination: Booking
"#;
        let def = StructuredDefinition::parse(Level::Context, yaml).unwrap();
        let violations = def.validate(Level::Context);

        assert!(violations.iter().any(|v| v.contains("'API'")));
        assert!(violations.iter().any(|v| v.contains("unknown element 'Ghost'")));
    }

    #[test]
    fn test_validate_component_requires_parent() {
        let yaml = "level: component\nelements:\n  - type: component\n    name: Controller\n";
        let def = StructuredDefinition::parse(Level::Component, yaml).unwrap();
        assert_eq!(def.validate(Level::Component), vec!["missing 'parentContainer'"]);
    }

    #[test]
    fn test_templates_parse_and_validate() {
        for level in Level::all() {
            let template = StructuredDefinition::template(level);
            assert!(template.starts_with(&format!("# C4 Model: Level {}", level.number())));

            let parsed = StructuredDefinition::parse(level, &template).unwrap();
            assert_eq!(parsed, StructuredDefinition::example(level));
            assert!(parsed.validate(level).is_empty(), "{level} template invalid");
        }
    }

    #[test]
    fn test_yaml_uses_camel_case_keys() {
        let yaml = StructuredDefinition::example(Level::Component).to_yaml().unwrap();
        assert!(yaml.contains("parentContainer:"));
        assert!(yaml.contains("type: component"));
        assert!(yaml.contains("level: component"));
    }
}
