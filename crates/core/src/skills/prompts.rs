//! Default prompt templates bundled at compile time.
//!
//! Each template is a pair of system instructions and a message body with
//! `{placeholder}` variables. Backends render them with [`render`] against a
//! prompt's bindings.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A named prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub body: &'static str,
}

/// Direct, single-pass analysis of one level
pub const ANALYSIS: PromptTemplate = PromptTemplate {
    name: "analysis",
    system: include_str!("defaults/analysis_system.md"),
    body: include_str!("defaults/analysis.md"),
};

/// Analysis → structured definition
pub const STRUCTURE: PromptTemplate = PromptTemplate {
    name: "structure",
    system: include_str!("defaults/structure_system.md"),
    body: include_str!("defaults/structure.md"),
};

/// Structured definition + analysis → C4-PlantUML
pub const DIAGRAM: PromptTemplate = PromptTemplate {
    name: "diagram",
    system: include_str!("defaults/diagram_system.md"),
    body: include_str!("defaults/diagram.md"),
};

/// One participant's turn in a collaborative analysis
pub const TEAM_MEMBER: PromptTemplate = PromptTemplate {
    name: "team_member",
    system: include_str!("defaults/team_member_system.md"),
    body: include_str!("defaults/team_member.md"),
};

/// Lossless consolidation of a collaborative transcript
pub const REPORT_GENERATOR: PromptTemplate = PromptTemplate {
    name: "report_generator",
    system: include_str!("defaults/report_generator_system.md"),
    body: include_str!("defaults/report_generator.md"),
};

/// C4-PlantUML syntax reference handed to the diagram stage
pub const DIAGRAM_SYNTAX_GUIDE: &str = include_str!("defaults/diagram_syntax.md");

/// All default templates
pub fn all_defaults() -> Vec<PromptTemplate> {
    vec![ANALYSIS, STRUCTURE, DIAGRAM, TEAM_MEMBER, REPORT_GENERATOR]
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"))
}

/// Substitute `{name}` placeholders. Unbound placeholders are left verbatim.
pub fn render(template: &str, bindings: &BTreeMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures| match bindings.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                tracing::debug!(placeholder = &caps[1], "Unbound prompt placeholder");
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Remove a surrounding markdown code fence (```yaml ... ```), if any
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines = trimmed.lines();
    lines.next();
    let mut body: Vec<&str> = lines.collect();
    if body.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        body.pop();
    }
    body.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        for template in all_defaults() {
            assert!(
                template.system.len() > 20,
                "System prompt '{}' seems too short",
                template.name
            );
            assert!(
                template.body.len() > 20,
                "Body '{}' seems too short",
                template.name
            );
        }
        assert!(DIAGRAM_SYNTAX_GUIDE.contains("@startuml"));
    }

    #[test]
    fn test_template_names_unique() {
        let mut names: Vec<_> = all_defaults().iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_render_substitutes_bound_placeholders() {
        let mut bindings = BTreeMap::new();
        bindings.insert("level".to_string(), "container".to_string());
        bindings.insert("brief".to_string(), "A {booking} system".to_string());

        let out = render("Level: {level}\nBrief: {brief}\nMissing: {other}", &bindings);
        assert_eq!(out, "Level: container\nBrief: A {booking} system\nMissing: {other}");
    }

    #[test]
    fn test_analysis_template_placeholders() {
        for placeholder in ["{level}", "{brief}", "{context}", "{component_target}"] {
            assert!(ANALYSIS.body.contains(placeholder), "missing {placeholder}");
        }
        assert!(REPORT_GENERATOR.system.contains("{system_brief}"));
        assert!(TEAM_MEMBER.system.contains("{persona}"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```yaml\nlevel: context\n```"), "level: context");
        assert_eq!(strip_code_fences("  @startuml\n@enduml  "), "@startuml\n@enduml");
        assert_eq!(strip_code_fences("```\nunterminated"), "unterminated");
    }
}
