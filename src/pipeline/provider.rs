//! [`InferenceClient`] backed by an `edgequake-llm` provider.
//!
//! Lets any provider the LLM layer supports (OpenAI, Anthropic, Gemini,
//! Ollama, ...) stand in for the raw HTTP endpoint. Provider errors are
//! classified by their [`LlmError`] variant.

use crate::config::ExtractionConfig;
use crate::error::ScribeError;
use crate::pipeline::client::{InferenceClient, InferenceOutcome};
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use std::sync::Arc;

/// Adapter from [`LLMProvider`] to [`InferenceClient`].
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    instruction: String,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            instruction: config.instruction_text().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Use `config.provider` if set, else build `config.provider_name` with `config.model`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ScribeError> {
        if let Some(ref provider) = config.provider {
            return Ok(Self::new(Arc::clone(provider), config));
        }

        let name = config
            .provider_name
            .as_deref()
            .ok_or_else(|| ScribeError::InvalidConfig("no LLM provider configured".into()))?;

        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            ScribeError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;

        Ok(Self::new(provider, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl InferenceClient for ProviderClient {
    async fn transcribe(&self, page: &EncodedPage) -> InferenceOutcome {
        let image = ImageData::new(page.base64.clone(), page.mime_type).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(
            self.instruction.as_str(),
            vec![image],
        )];
        let options = self.options();

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => InferenceOutcome::Text(response.content),
            Err(e) => classify_provider_error(&e),
        }
    }
}

/// Sort a provider error into an [`InferenceOutcome`].
pub fn classify_provider_error(err: &LlmError) -> InferenceOutcome {
    match err {
        LlmError::RateLimited(_) => InferenceOutcome::RateLimited {
            detail: err.to_string(),
        },
        LlmError::Timeout => InferenceOutcome::Transient {
            detail: err.to_string(),
            timed_out: true,
        },
        other => InferenceOutcome::transient(other.to_string()),
    }
}
