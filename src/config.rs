#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default ceiling on estimated input tokens per request.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 180_000;
/// Default characters-per-token divisor used for the size estimate.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;
/// Default number of characters of malformed output echoed in a repair
/// request.
pub const DEFAULT_REPAIR_PREVIEW_CHARS: usize = 2_000;
/// Maximum used for a manual criterion that the rubric does not define.
pub const DEFAULT_MANUAL_MAXIMUM: f64 = 5.0;
/// Upper bound on the short external summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Tuning for a grading run. Built once and handed to the batch
/// orchestrator; nothing in the engine reads the environment on its own.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier sent with each request.
    pub model:                String,
    /// Budget for generated tokens per call.
    #[builder(default = 4096)]
    pub max_output_tokens:    u32,
    /// Sampling temperature.
    #[builder(default = 0.3)]
    pub temperature:          f32,
    /// Ceiling on the estimated input size.
    #[builder(default = DEFAULT_MAX_INPUT_TOKENS)]
    pub max_input_tokens:     usize,
    /// Characters per token used by the size estimate.
    #[builder(default = DEFAULT_CHARS_PER_TOKEN)]
    pub chars_per_token:      usize,
    /// Characters of the malformed output included in a repair request.
    #[builder(default = DEFAULT_REPAIR_PREVIEW_CHARS)]
    pub repair_preview_chars: usize,
    /// Maximum assumed for manual criteria missing from the rubric.
    #[builder(default = DEFAULT_MANUAL_MAXIMUM)]
    pub default_manual_max:   f64,
    /// Character bound for the external summary.
    #[builder(default = SUMMARY_MAX_CHARS)]
    pub summary_max_chars:    usize,
    /// Number of submissions in flight at once. `1` keeps the run strictly
    /// sequential.
    #[builder(default = 1)]
    pub workers:              usize,
    /// Per-request timeout applied by the HTTP transport, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().model("gpt-4o").build()
    }
}

impl EngineConfig {
    /// Returns the transport timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the worker count, never less than one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Provider credentials and optional tuning read from the environment by
/// the binary.
#[derive(Clone)]
pub struct ProviderEnv {
    /// Base URL for the OpenAI-compatible endpoint.
    api_base:    String,
    /// API key used to authenticate requests.
    api_key:     String,
    /// Default model identifier.
    model:       String,
    /// Optional temperature override.
    temperature: Option<f32>,
    /// Optional max output tokens override.
    max_tokens:  Option<u32>,
    /// Optional input ceiling override.
    max_input:   Option<usize>,
    /// Optional chars-per-token override.
    chars_per:   Option<usize>,
    /// Optional request timeout override, in seconds.
    timeout:     Option<u64>,
}

impl std::fmt::Debug for ProviderEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEnv")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Reads a required, non-empty environment variable.
fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingEnv(name))
}

/// Reads and parses an optional environment variable, ignoring values that
/// do not parse.
fn optional<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

impl ProviderEnv {
    /// Builds the provider configuration from `RETRO_*` environment
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = std::env::var("RETRO_API_BASE")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            api_base,
            api_key: required("RETRO_API_KEY")?,
            model: required("RETRO_MODEL")?,
            temperature: optional("RETRO_TEMPERATURE"),
            max_tokens: optional("RETRO_MAX_TOKENS"),
            max_input: optional("RETRO_MAX_INPUT_TOKENS"),
            chars_per: optional("RETRO_CHARS_PER_TOKEN"),
            timeout: optional("RETRO_TIMEOUT_SECS"),
        })
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Folds the environment overrides into an engine configuration.
    pub fn engine_config(&self, workers: usize) -> EngineConfig {
        EngineConfig::builder()
            .model(self.model.clone())
            .maybe_request_timeout_secs(self.timeout)
            .max_output_tokens(self.max_tokens.unwrap_or(4096))
            .temperature(self.temperature.unwrap_or(0.3))
            .max_input_tokens(self.max_input.unwrap_or(DEFAULT_MAX_INPUT_TOKENS))
            .chars_per_token(self.chars_per.unwrap_or(DEFAULT_CHARS_PER_TOKEN).max(1))
            .workers(workers)
            .build()
    }
}
