//! # Radkit Backend
//!
//! Production [`GenerationBackend`] built on radkit's `LlmFunction`.
//! Text requests decode into [`TextReply`]; structured requests decode
//! directly into a [`StructuredDefinition`].

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GenerationBackend, Generated, Prompt, ResponseFormat};
use crate::models::ModelConfig;
use crate::state::schema::StructuredDefinition;

/// Free-text answer wrapper
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct TextReply {
    /// The complete answer, as markdown or diagram source
    pub text: String,
}

/// Runs an `LlmFunction<$output>` against the provider `$config` names.
/// Client construction (API key lookup) returns early through `?`.
macro_rules! dispatch_llm_function {
    ($config:expr, $output:ty, $system:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config: &ModelConfig = $config;
        let system: String = $system;
        let input: String = $input;

        let result: anyhow::Result<$output> = match config.provider {
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)?;
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)?;
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                let llm = OpenRouterLlm::from_env(&config.model)?;
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
            LlmProvider::Grok => {
                let llm = GrokLlm::from_env(&config.model)?;
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                let llm = DeepSeekLlm::from_env(&config.model)?;
                let func = LlmFunction::<$output>::new_with_system_instructions(llm, system);
                func.run(input).await.map_err(Into::into)
            }
        };
        result
    }};
}

/// Backend for one model configuration
#[derive(Debug, Clone)]
pub struct RadkitBackend {
    config: ModelConfig,
}

impl RadkitBackend {
    pub fn new(config: ModelConfig) -> Self {
        if config.base_url.is_some() && !config.provider.supports_base_url() {
            tracing::warn!(
                provider = config.provider.display_name(),
                "base_url is only honoured for OpenAI-compatible providers; ignoring"
            );
        }
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationBackend for RadkitBackend {
    fn name(&self) -> &str {
        &self.config.model
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.config.model, template = prompt.name()))]
    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<Generated> {
        self.config.check_api_key()?;
        let system = prompt.system_text();
        let input = prompt.user_text();

        // TODO: pass config.temperature once radkit's LlmFunction exposes sampling options
        match prompt.format {
            ResponseFormat::Text => {
                let reply = dispatch_llm_function!(&self.config, TextReply, system, input)?;
                Ok(Generated::Text(reply.text))
            }
            ResponseFormat::Structured(_) => {
                let definition =
                    dispatch_llm_function!(&self.config, StructuredDefinition, system, input)?;
                Ok(Generated::Structured(serde_json::to_value(definition)?))
            }
        }
    }
}
