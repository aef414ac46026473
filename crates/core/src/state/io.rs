//! # IO Utilities
//!
//! File system operations for run artifacts, briefs and the `.c4forge`
//! home directory.
//!
//! Artifact layout:
//!
//! ```text
//! <dir>/1_context_analysis.md     1_context_definition.yaml     1_context_diagram.puml
//! <dir>/2_container_analysis.md   2_container_definition.yaml   2_container_diagram.puml
//! <dir>/3_components/<slug>_analysis.md | <slug>_definition.yaml | <slug>_diagram.puml
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

use super::model::{C4Model, Field, Level, LevelOutput};
use super::schema::StructuredDefinition;

const COMPONENTS_DIR: &str = "3_components";

/// Get the home directory path (.c4forge)
pub fn get_home_path() -> PathBuf {
    if let Ok(path) = std::env::var("C4FORGE_HOME") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".c4forge")
}

/// Slugify to a safe lowercase file name
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    static REPEATED: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("valid regex"));
    let repeated = REPEATED.get_or_init(|| Regex::new(r"_{2,}").expect("valid regex"));

    let replaced = unsafe_chars.replace_all(name, "_");
    let trimmed = replaced.trim_matches('_');
    repeated.replace_all(trimmed, "_").to_lowercase()
}

/// Slug for `name` not yet in `used`. Later names that collide get `_2`, `_3`, ...
fn unique_slug(name: &str, used: &mut HashSet<String>) -> String {
    let mut base = sanitize_filename(name);
    if base.is_empty() {
        base = "component".to_string();
    }
    let mut slug = base.clone();
    let mut n = 2;
    while used.contains(&slug) {
        slug = format!("{}_{}", base, n);
        n += 1;
    }
    if slug != base {
        tracing::warn!(component = name, slug = %slug, "Component slug collision, using suffixed name");
    }
    used.insert(slug.clone());
    slug
}

fn suffix(field: Field) -> &'static str {
    match field {
        Field::Analysis => "analysis.md",
        Field::StructuredDefinition => "definition.yaml",
        Field::Diagram => "diagram.puml",
    }
}

fn level_prefix(level: Level) -> String {
    format!("{}_{}", level.number(), level)
}

async fn write_output(dir: &Path, prefix: &str, output: &LevelOutput) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for field in Field::ORDER {
        let Some(content) = output.get(field) else {
            continue;
        };
        let path = dir.join(format!("{}_{}", prefix, suffix(field)));
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write artifact: {:?}", path))?;
        written.push(path);
    }
    Ok(written)
}

async fn read_output(dir: &Path, prefix: &str) -> Result<LevelOutput> {
    let mut output = LevelOutput::default();
    for field in Field::ORDER {
        let path = dir.join(format!("{}_{}", prefix, suffix(field)));
        if fs::metadata(&path).await.is_err() {
            continue;
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read artifact: {:?}", path))?;
        match field {
            Field::Analysis => output.analysis = Some(content),
            Field::StructuredDefinition => output.structured_definition = Some(content),
            Field::Diagram => output.diagram = Some(content),
        }
    }
    Ok(output)
}

/// Save every present field of `model` under `dir`. Returns the files written.
pub async fn save_artifacts(dir: impl AsRef<Path>, model: &C4Model) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create artifacts directory: {:?}", dir))?;

    let mut written = write_output(dir, &level_prefix(Level::Context), &model.context).await?;
    written.extend(write_output(dir, &level_prefix(Level::Container), &model.containers).await?);

    if !model.components.is_empty() {
        let components_dir = dir.join(COMPONENTS_DIR);
        fs::create_dir_all(&components_dir)
            .await
            .with_context(|| format!("Failed to create directory: {:?}", components_dir))?;
        let mut used = HashSet::new();
        for (name, output) in &model.components {
            let slug = unique_slug(name, &mut used);
            written.extend(write_output(&components_dir, &slug, output).await?);
        }
    }

    tracing::info!(dir = ?dir, files = written.len(), "Artifacts saved");
    Ok(written)
}

/// Rebuild a model from a directory written by [`save_artifacts`].
///
/// Component names come from the definition's `parentContainer.name` when it
/// parses, otherwise from the file slug.
pub async fn load_artifacts(dir: impl AsRef<Path>) -> Result<C4Model> {
    let dir = dir.as_ref();
    if fs::metadata(dir).await.is_err() {
        anyhow::bail!("Artifacts directory not found: {:?}", dir);
    }

    let mut model = C4Model::new();
    model.context = read_output(dir, &level_prefix(Level::Context)).await?;
    model.containers = read_output(dir, &level_prefix(Level::Container)).await?;

    let components_dir = dir.join(COMPONENTS_DIR);
    for slug in component_slugs(&components_dir).await? {
        let output = read_output(&components_dir, &slug).await?;
        let name = output
            .structured_definition
            .as_deref()
            .and_then(|text| StructuredDefinition::parse(Level::Component, text).ok())
            .and_then(|definition| definition.parent_container)
            .map(|parent| parent.name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| slug.clone());
        model.components.insert(name, output);
    }

    Ok(model)
}

async fn component_slugs(dir: &Path) -> Result<Vec<String>> {
    if fs::metadata(dir).await.is_err() {
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory: {:?}", dir))?;

    let mut slugs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        let slug = Field::ORDER
            .iter()
            .find_map(|f| file_name.strip_suffix(&format!("_{}", suffix(*f))));
        if let Some(slug) = slug {
            if !slugs.iter().any(|s| s == slug) {
                slugs.push(slug.to_string());
            }
        }
    }
    slugs.sort();
    Ok(slugs)
}

/// Load every non-empty `*.yaml` / `*.yml` brief in `dir`, keyed by file stem.
///
/// A missing directory yields no briefs; unreadable or empty files are skipped.
pub async fn load_briefs_from_dir(dir: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let dir = dir.as_ref();
    let mut briefs = BTreeMap::new();

    if fs::metadata(dir).await.is_err() {
        tracing::warn!(dir = ?dir, "Briefs directory not found");
        return Ok(briefs);
    }

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory: {:?}", dir))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_yaml {
            continue;
        }

        match fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(file = ?path, "Skipping empty brief");
            }
            Ok(text) => {
                briefs.insert(stem.to_string(), text.trim().to_string());
            }
            Err(e) => tracing::warn!(file = ?path, "Failed to read brief: {}", e),
        }
    }

    Ok(briefs)
}

/// Read one brief file, returning `(name, text)`
pub async fn read_brief(path: impl AsRef<Path>) -> Result<(String, String)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read brief: {:?}", path))?;
    let text = text.trim().to_string();
    if text.is_empty() {
        anyhow::bail!("Brief is empty: {:?}", path);
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("brief")
        .to_string();
    Ok((name, text))
}
