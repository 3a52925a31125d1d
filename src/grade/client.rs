#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::future::Future;

use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use reqwest::Client;

use crate::{
    config::{EngineConfig, ProviderEnv},
    error::GradingError,
};

/// One request to the text-completion capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model:       String,
    /// Batch-constant instructions, if any. Sent first so providers can
    /// cache them.
    pub prefix:      Option<String>,
    /// Per-request content.
    pub suffix:      String,
    /// Budget for generated tokens.
    pub max_tokens:  u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// An opaque text-completion capability.
pub trait Capability {
    /// Sends one request and returns the raw text response.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// [`Capability`] backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiCapability {
    /// Configured API client.
    client: OpenAIClient<OpenAIConfig>,
}

impl OpenAiCapability {
    /// Creates a capability for the given endpoint and key.
    pub fn new(env: &ProviderEnv, config: &EngineConfig) -> Result<Self> {
        let mut http = Client::builder().no_proxy();
        if let Some(timeout) = config.request_timeout() {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .context("Failed to construct HTTP client for the capability")?;

        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(env.api_key().to_owned()),
        )
        .with_http_client(http);

        Ok(Self { client })
    }
}

impl Capability for OpenAiCapability {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if let Some(prefix) = request.prefix {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prefix)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.suffix)
                .build()?
                .into(),
        );

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(request.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| anyhow!("No content in completion response"))
    }
}

/// Local guard against inputs the provider would reject or truncate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGuard {
    /// Ceiling on estimated input tokens.
    pub max_input_tokens: usize,
    /// Characters per token used for the estimate.
    pub chars_per_token:  usize,
}

impl SizeGuard {
    /// Estimated tokens for `chars` characters of input.
    pub fn estimate(&self, chars: usize) -> usize {
        chars / self.chars_per_token.max(1)
    }

    /// Fails with [`GradingError::DocumentTooLarge`] when the estimate for
    /// `chars` exceeds the ceiling.
    pub fn check(&self, chars: usize) -> Result<usize, GradingError> {
        let estimated = self.estimate(chars);
        if estimated > self.max_input_tokens {
            return Err(GradingError::DocumentTooLarge {
                estimated,
                limit: self.max_input_tokens,
            });
        }
        Ok(estimated)
    }
}

/// Wraps a [`Capability`] with model parameters and the size guard.
pub struct CapabilityClient<C> {
    /// Underlying transport.
    transport:   C,
    /// Model identifier.
    model:       String,
    /// Budget for generated tokens.
    max_tokens:  u32,
    /// Sampling temperature.
    temperature: f32,
    /// Input-size guard.
    guard:       SizeGuard,
}

impl<C: Capability> CapabilityClient<C> {
    /// Creates a client using the model parameters in `config`.
    pub fn new(transport: C, config: &EngineConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            guard: SizeGuard {
                max_input_tokens: config.max_input_tokens,
                chars_per_token:  config.chars_per_token,
            },
        }
    }

    /// The size guard in use.
    pub fn guard(&self) -> SizeGuard {
        self.guard
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Sends `prefix` + `suffix` and returns the raw response.
    ///
    /// The size check happens before the transport is touched. Transport
    /// errors are returned as [`GradingError::Transport`] and never retried
    /// here.
    pub async fn send(&self, prefix: Option<&str>, suffix: &str) -> Result<String, GradingError> {
        let chars = prefix.map_or(0, |p| p.chars().count()) + suffix.chars().count();
        let estimated = self.guard.check(chars)?;
        tracing::debug!("Sending request ({chars} chars, ~{estimated} tokens) to {}", self.model);

        self.transport
            .complete(CompletionRequest {
                model:       self.model.clone(),
                prefix:      prefix.map(str::to_owned),
                suffix:      suffix.to_owned(),
                max_tokens:  self.max_tokens,
                temperature: self.temperature,
            })
            .await
            .map_err(GradingError::Transport)
    }
}
