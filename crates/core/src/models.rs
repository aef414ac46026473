//! # Model Configuration
//!
//! LLM provider and model selection for generation capabilities.
//! A capability is addressed by model name; [`ModelConfig::for_capability`]
//! resolves which provider serves it.

use serde::{Deserialize, Serialize};

/// Supported LLM providers
///
/// Each provider reads its API key from the environment:
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
/// - Gemini (Google) - `GEMINI_API_KEY`
/// - OpenRouter (Gateway) - `OPENROUTER_API_KEY`
/// - Grok (xAI) - `XAI_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    #[default]
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Environment variable holding the provider's API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Grok => "XAI_API_KEY",
            LlmProvider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

/// Model names known to work with the generation prompts
pub const KNOWN_MODELS: &[(&str, LlmProvider)] = &[
    ("gemini-1.5-flash-latest", LlmProvider::Gemini),
    ("gemini-1.5-pro-latest", LlmProvider::Gemini),
    ("gemini-2.5-flash-preview-05-20", LlmProvider::Gemini),
    ("gemini-2.5-pro-preview-05-20", LlmProvider::Gemini),
    ("gemini-2.5-pro-preview-06-05", LlmProvider::Gemini),
    ("gpt-4o", LlmProvider::OpenAI),
    ("gpt-4o-mini", LlmProvider::OpenAI),
    ("deepseek-chat", LlmProvider::DeepSeek),
    ("grok-beta", LlmProvider::Grok),
    ("grok-3-latest", LlmProvider::Grok),
    ("claude-sonnet-4-20250514", LlmProvider::Anthropic),
];

/// Configuration for one generation capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "gemini-1.5-flash-latest", "gpt-4o")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    pub base_url: Option<String>,
    /// Sampling temperature requested for this capability
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: None,
            temperature: 0.0,
        }
    }
}

impl ModelConfig {
    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            temperature: 0.0,
        }
    }

    /// Resolve the provider serving a capability name.
    ///
    /// Known model names map directly; otherwise the name's prefix decides
    /// (`gpt-`/`o1`/`o3` → OpenAI, `gemini-` → Gemini, `claude-` → Anthropic,
    /// `grok-` → Grok, `deepseek-` → DeepSeek, `vendor/model` → OpenRouter).
    pub fn for_capability(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some((_, provider)) = KNOWN_MODELS.iter().find(|(known, _)| *known == name) {
            return Some(Self::with_provider(provider.clone(), name));
        }

        let provider = if name.contains('/') {
            LlmProvider::OpenRouter
        } else if name.starts_with("gpt-") || name.starts_with("o1") || name.starts_with("o3") {
            LlmProvider::OpenAI
        } else if name.starts_with("gemini-") {
            LlmProvider::Gemini
        } else if name.starts_with("claude-") {
            LlmProvider::Anthropic
        } else if name.starts_with("grok-") {
            LlmProvider::Grok
        } else if name.starts_with("deepseek-") {
            LlmProvider::DeepSeek
        } else {
            return None;
        };

        Some(Self::with_provider(provider, name))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Fail early when the provider's API key is not in the environment
    pub fn check_api_key(&self) -> anyhow::Result<()> {
        let var = self.provider.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(()),
            _ => anyhow::bail!(
                "{} is not set (required by {} model '{}')",
                var,
                self.provider.display_name(),
                self.model
            ),
        }
    }
}
