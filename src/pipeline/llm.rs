//! The AI collaborator: one multimodal call, plus retry with linear backoff.
//!
//! [`VisionModel`] is the seam. [`LlmVisionModel`] drives an
//! `edgequake_llm` provider on a private current-thread runtime, so the rest
//! of the pipeline stays synchronous and runs on a single worker thread.
//! [`ExtractionClient`] wraps any model with the retry policy.
//!
//! Only availability failures are retried. A reply that arrives but cannot
//! be parsed is the repair step's problem; asking again for the same pages
//! spends quota on an answer that is just as likely to be malformed.

use crate::config::{ExtractorConfig, RetryPolicy};
use crate::error::{truncate_detail, ExtractorError, StatementError};
use crate::progress::Reporter;
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, ImageData, LLMProvider,
    OpenAIProvider, OpenRouterProvider, ProviderFactory,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single model call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Timeout, rate limit, 5xx, connection reset. Worth another attempt.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Bad credential or malformed request. Another attempt cannot help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ModelError {
    /// Sort a provider error message into retryable or not.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let rejected = ["401", "403", "unauthorized", "forbidden", "invalid api key", "api key not valid", "permission denied"]
            .iter()
            .any(|m| lower.contains(m));
        if rejected {
            ModelError::Rejected(message)
        } else {
            ModelError::Unavailable(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Unavailable(_))
    }
}

/// A multimodal text generator: prompt first, then the page images.
pub trait VisionModel: Send + Sync {
    fn generate(&self, prompt: &str, images: &[ImageData]) -> Result<String, ModelError>;
}

impl<T: VisionModel + ?Sized> VisionModel for Arc<T> {
    fn generate(&self, prompt: &str, images: &[ImageData]) -> Result<String, ModelError> {
        (**self).generate(prompt, images)
    }
}

impl<T: VisionModel + ?Sized> VisionModel for Box<T> {
    fn generate(&self, prompt: &str, images: &[ImageData]) -> Result<String, ModelError> {
        (**self).generate(prompt, images)
    }
}

/// Blocking waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling (worker) thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Box<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Production model: an `edgequake_llm` provider driven synchronously.
pub struct LlmVisionModel {
    label: String,
    provider: Arc<dyn LLMProvider>,
    runtime: tokio::runtime::Runtime,
    options: CompletionOptions,
    timeout: Duration,
}

impl std::fmt::Debug for LlmVisionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmVisionModel")
            .field("model", &self.label)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmVisionModel {
    /// Build from the run configuration. Must be called on the thread that
    /// will make the calls: the runtime is single-threaded.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractorError> {
        let provider = resolve_provider(config)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExtractorError::Worker(format!("cannot start async runtime: {e}")))?;
        Ok(Self {
            label: format!("{}/{}", config.provider_name, config.model),
            provider,
            runtime,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        })
    }
}

impl VisionModel for LlmVisionModel {
    fn generate(&self, prompt: &str, images: &[ImageData]) -> Result<String, ModelError> {
        let messages = vec![ChatMessage::user_with_images(prompt, images.to_vec())];
        let call = self.provider.chat(&messages, Some(&self.options));

        match self.runtime.block_on(tokio::time::timeout(self.timeout, call)) {
            Ok(Ok(response)) => {
                debug!(
                    "{} image(s): {} input tokens, {} output tokens",
                    images.len(),
                    response.prompt_tokens,
                    response.completion_tokens
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(ModelError::classify(e.to_string())),
            Err(_) => Err(ModelError::Unavailable(format!(
                "no reply within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Build `CompletionOptions` from the run config.
fn build_options(config: &ExtractorConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Construct a provider that takes its credential directly.
///
/// `None` for providers without a key-taking constructor; those read their
/// own environment through the factory.
fn keyed_provider(provider_name: &str, api_key: &str, model: &str) -> Option<Arc<dyn LLMProvider>> {
    let key = api_key.trim();
    let provider: Arc<dyn LLMProvider> = match provider_name.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Arc::new(GeminiProvider::new(key).with_model(model)),
        "openai" => Arc::new(OpenAIProvider::new(key).with_model(model)),
        "anthropic" | "claude" => Arc::new(AnthropicProvider::new(key).with_model(model)),
        "openrouter" => Arc::new(OpenRouterProvider::new(key).with_model(model)),
        _ => return None,
    };
    Some(provider)
}

/// A pre-built provider wins, then a keyed constructor, then the factory.
///
/// The credential never goes through the process environment.
fn resolve_provider(config: &ExtractorConfig) -> Result<Arc<dyn LLMProvider>, ExtractorError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(provider) = keyed_provider(&config.provider_name, &config.api_key, &config.model) {
        return Ok(provider);
    }

    warn!(
        "Provider '{}' takes no key directly; relying on its own environment",
        config.provider_name
    );
    ProviderFactory::create_llm_provider(&config.provider_name, &config.model).map_err(|e| {
        ExtractorError::ProviderNotConfigured {
            provider: config.provider_name.clone(),
            hint: format!("model '{}': {e}", config.model),
        }
    })
}

/// Retrying front-end over a [`VisionModel`].
pub struct ExtractionClient<'a> {
    model: &'a dyn VisionModel,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
    reporter: Reporter,
}

impl<'a> ExtractionClient<'a> {
    pub fn new(model: &'a dyn VisionModel, sleeper: &'a dyn Sleeper, retry: RetryPolicy) -> Self {
        Self {
            model,
            sleeper,
            retry,
            reporter: Reporter::default(),
        }
    }

    pub(crate) fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Send `prompt` + `images`, retrying availability failures.
    ///
    /// After failed attempt *n* the client waits `retry.delay_after(n)`;
    /// there is no wait after the last attempt.
    pub fn request(&self, prompt: &str, images: &[ImageData]) -> Result<String, StatementError> {
        let max = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.model.generate(prompt, images) {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => {
                    warn!("AI call rejected, not retrying: {}", e);
                    return Err(StatementError::Transport {
                        attempts: attempt,
                        detail: truncate_detail(&e.to_string()),
                    });
                }
                Err(e) if attempt >= max => {
                    warn!("AI call failed on final attempt {}/{}: {}", attempt, max, e);
                    return Err(StatementError::Transport {
                        attempts: max,
                        detail: truncate_detail(&e.to_string()),
                    });
                }
                Err(e) => {
                    let wait = self.retry.delay_after(attempt);
                    self.reporter.line(format!(
                        "    AI unavailable (attempt {attempt}/{max}), retrying in {:.1}s: {}",
                        wait.as_secs_f32(),
                        truncate_detail(&e.to_string())
                    ));
                    self.sleeper.sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}
