//! Configuration types for page-by-page extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Endpoint, model, and every delay live
//! here rather than in module-level constants, so two extractors with
//! different settings can run in the same process.

use crate::error::ScribeError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Primary environment variable holding the API credential.
pub const API_KEY_ENV: &str = "PDFSCRIBE_API_KEY";

/// Fallback environment variable, checked when [`API_KEY_ENV`] is unset.
pub const API_KEY_FALLBACK_ENV: &str = "SILICONFLOW_API_KEY";

/// Default OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/chat/completions";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-VL-72B-Instruct";

/// Rate-limit backoff floor in seconds. 429s are never retried sooner.
pub const MIN_RATE_LIMIT_BACKOFF_SECS: u64 = 30;

/// Configuration for a document extraction run.
///
/// Built via [`ExtractionConfig::builder()`]. `Default` yields every default
/// value but no API key.
///
/// # Example
/// ```rust
/// use pdfscribe::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-example")
///     .scale(2.0)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_delay_secs, 3);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Bearer credential for the HTTP endpoint. No default.
    pub api_key: Option<String>,

    /// Chat-completions URL the page images are POSTed to.
    pub endpoint: String,

    /// Model identifier sent with every request and recorded in the result.
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic"). When set, requests go
    /// through `edgequake-llm` instead of the raw HTTP endpoint.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom instruction text. If None, uses [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// Resolution multiplier applied to both axes when rasterising. Default: 2.0.
    ///
    /// Higher values give the model sharper glyphs at the cost of larger
    /// request payloads.
    pub scale: f32,

    /// Maximum tokens the model may generate per page. Default: 4000.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Attempts per page before it is recorded as failed. Default: 3.
    pub max_attempts: u32,

    /// Wait after a transient error, in seconds. Default: 5.
    pub retry_delay_secs: u64,

    /// Wait after a request timeout, in seconds. Default: 10.
    pub timeout_retry_delay_secs: u64,

    /// Wait after an HTTP 429, in seconds. Default and minimum: 30.
    pub rate_limit_backoff_secs: u64,

    /// Consecutive 429 responses that together count as one failed attempt. Default: 3.
    ///
    /// Caps the otherwise unbounded rate-limit loop: a page sends at most
    /// `max_attempts * max_consecutive_rate_limits` requests.
    pub max_consecutive_rate_limits: u32,

    /// Pause between consecutive pages, in seconds. Default: 3.
    pub page_delay_secs: u64,

    /// Per-request timeout, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional per-page event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            instruction: None,
            scale: 2.0,
            max_tokens: 4000,
            temperature: 0.1,
            max_attempts: 3,
            retry_delay_secs: 5,
            timeout_retry_delay_secs: 10,
            rate_limit_backoff_secs: MIN_RATE_LIMIT_BACKOFF_SECS,
            max_consecutive_rate_limits: 3,
            page_delay_secs: 3,
            request_timeout_secs: 120,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("scale", &self.scale)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("timeout_retry_delay_secs", &self.timeout_retry_delay_secs)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .field("max_consecutive_rate_limits", &self.max_consecutive_rate_limits)
            .field("page_delay_secs", &self.page_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The inter-page pause as a [`Duration`].
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    /// The per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The instruction text that will accompany every page image.
    pub fn instruction_text(&self) -> &str {
        self.instruction
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_INSTRUCTION)
    }

    /// Whether requests are routed through an `edgequake-llm` provider.
    pub fn uses_provider(&self) -> bool {
        self.provider.is_some() || self.provider_name.is_some()
    }
}

/// Read the API key from [`API_KEY_ENV`], falling back to [`API_KEY_FALLBACK_ENV`].
///
/// Empty values are treated as unset.
pub fn api_key_from_env() -> Option<String> {
    [API_KEY_ENV, API_KEY_FALLBACK_ENV]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Fill the API key from the environment if one has not been set explicitly.
    pub fn api_key_from_env(mut self) -> Self {
        if self.config.api_key.is_none() {
            self.config.api_key = api_key_from_env();
        }
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale.clamp(0.5, 6.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry_delay_secs = secs;
        self
    }

    pub fn timeout_retry_delay_secs(mut self, secs: u64) -> Self {
        self.config.timeout_retry_delay_secs = secs;
        self
    }

    pub fn rate_limit_backoff_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_backoff_secs = secs.max(MIN_RATE_LIMIT_BACKOFF_SECS);
        self
    }

    pub fn max_consecutive_rate_limits(mut self, n: u32) -> Self {
        self.config.max_consecutive_rate_limits = n.max(1);
        self
    }

    pub fn page_delay_secs(mut self, secs: u64) -> Self {
        self.config.page_delay_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The API key is only required when requests go to the raw HTTP
    /// endpoint; provider-backed configs authenticate through `edgequake-llm`.
    pub fn build(self) -> Result<ExtractionConfig, ScribeError> {
        let c = &self.config;
        if !c.uses_provider() {
            match c.api_key.as_deref() {
                Some(key) if !key.trim().is_empty() => {}
                _ => return Err(ScribeError::MissingApiKey),
            }
            if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
                return Err(ScribeError::InvalidConfig(format!(
                    "endpoint must be an HTTP/HTTPS URL, got '{}'",
                    c.endpoint
                )));
            }
        }
        if c.model.trim().is_empty() {
            return Err(ScribeError::InvalidConfig("model must not be empty".into()));
        }
        if !c.scale.is_finite() || c.scale <= 0.0 {
            return Err(ScribeError::InvalidConfig(format!(
                "scale must be a positive number, got {}",
                c.scale
            )));
        }
        if c.max_tokens == 0 {
            return Err(ScribeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(ScribeError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
