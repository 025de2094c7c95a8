//! Text generation: the seam between pipeline stages and an LLM provider.
//!
//! Stages talk to a [`TextGenerator`], never to a provider directly, so tests
//! can script responses in-process. [`LlmTextGenerator`] is the production
//! adapter over an `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! `max_retries` defaults to 0: a failed call skips the page or invoice it
//! belonged to. When retries are enabled the wait is
//! `retry_backoff_ms * 2^(attempt-1)`, i.e. 500 ms → 1 s → 2 s with the
//! default base.

use crate::config::PipelineConfig;
use crate::error::{GenerationError, InvoiceError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Role of one prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One message of a text-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The answer to one text-generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Generation {
    /// A generation with no token accounting, handy for doubles.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Anything that turns a list of prompt messages into one text response.
///
/// No streaming, no conversation state: every call stands alone.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
        (**self).generate(messages).await
    }
}

/// Wraps a generator and totals the token usage of every successful call.
pub struct MeteredGenerator<G> {
    inner: G,
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl<G> MeteredGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Successful calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for MeteredGenerator<G> {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
        let generation = self.inner.generate(messages).await?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(generation.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(generation.output_tokens, Ordering::Relaxed);
        Ok(generation)
    }
}

/// [`TextGenerator`] backed by an `edgequake_llm` chat provider.
pub struct LlmTextGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: Option<u64>,
}

impl LlmTextGenerator {
    /// Wrap `provider`, taking sampling, retry and timeout settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve a provider from `config` (see [`resolve_provider`]) and wrap it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, InvoiceError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    async fn chat_once(&self, messages: &[ChatMessage]) -> Result<Generation, String> {
        let call = self.provider.chat(messages, Some(&self.options));
        let response = match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| format!("timed out after {secs}s"))?,
            None => call.await,
        }
        .map_err(|e| e.to_string())?;

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
        if messages.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        let chat: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();

        let start = Instant::now();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!("LLM call: retry {}/{} after {}ms", attempt, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.chat_once(&chat).await {
                Ok(generation) => {
                    debug!(
                        "LLM call: {} input tokens, {} output tokens, {:?}",
                        generation.input_tokens,
                        generation.output_tokens,
                        start.elapsed()
                    );
                    return Ok(generation);
                }
                Err(e) => {
                    warn!("LLM call: attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        // A single timed-out attempt reports as a timeout; anything else as a failure.
        match (self.timeout_secs, self.max_retries, last_err) {
            (Some(secs), 0, Some(e)) if e.starts_with("timed out") => {
                Err(GenerationError::Timeout { secs })
            }
            (_, retries, e) => Err(GenerationError::Failed {
                retries,
                detail: e.unwrap_or_else(|| "Unknown error".to_string()),
            }),
        }
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn to_chat_message(m: &Message) -> ChatMessage {
    match m.role {
        Role::System => ChatMessage::system(&m.content),
        Role::User => ChatMessage::user(&m.content),
    }
}

/// Build `CompletionOptions` from the pipeline config.
pub(crate) fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is;
/// 2. `config.provider_name` with `config.model` (default [`DEFAULT_MODEL`]);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI, when `OPENAI_API_KEY` is set;
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// In-process generator doubles for stage unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Answers every call with the result of a closure over the messages.
    pub(crate) struct FnGenerator<F>(F);

    impl<F> FnGenerator<F>
    where
        F: Fn(&[Message]) -> Result<Generation, GenerationError> + Send + Sync,
    {
        pub(crate) fn new(f: F) -> Self {
            Self(f)
        }
    }

    #[async_trait]
    impl<F> TextGenerator for FnGenerator<F>
    where
        F: Fn(&[Message]) -> Result<Generation, GenerationError> + Send + Sync,
    {
        async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
            (self.0)(messages)
        }
    }

    /// Concatenated content of all messages, for routing on prompt text.
    pub(crate) fn joined(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn failure(detail: &str) -> GenerationError {
        GenerationError::Failed {
            retries: 0,
            detail: detail.to_string(),
        }
    }
}
