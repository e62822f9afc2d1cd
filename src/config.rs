//! Configuration types for a statement-consolidation run.
//!
//! Everything the run needs from its caller (source folder, document
//! password, AI credential, retry and paging knobs) lives in
//! [`ExtractorConfig`], built via [`ExtractorConfigBuilder`]. The upstream
//! collaborator that stores credentials is out of scope; the builder only
//! checks that the inputs are present and that the credential is not
//! obviously truncated.

use crate::error::ExtractorError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shortest credential accepted by [`ExtractorConfigBuilder::build`].
pub const MIN_API_KEY_LEN: usize = 20;

/// Default name of the consolidated workbook written inside the folder.
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "Extractos_Consolidados.xlsx";

/// Default provider and model: a cheap, fast multimodal model.
pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Retry behaviour for AI calls that fail with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per unit of work, including the first. Default: 3.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; grows linearly. Default: 2 s.
    pub base_delay: Duration,
    /// Upper bound on a single wait. Default: 10 s.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt after `attempt` (1-based) failed:
    /// `attempt × base_delay`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

/// Configuration for one consolidation run over a folder.
///
/// # Example
/// ```rust
/// use statement2xlsx::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .folder("/home/me/extractos")
///     .password("1032456789")
///     .api_key("AIzaSy-0123456789abcdefghijklmnop")
///     .per_page_threshold(3)
///     .build()
///     .unwrap();
/// assert!(config.output_path().ends_with("Extractos_Consolidados.xlsx"));
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    /// Folder holding the statement PDFs; the workbook is written here too.
    pub folder: PathBuf,

    /// Password shared by the statement PDFs.
    pub password: String,

    /// Credential for the AI provider.
    pub api_key: String,

    /// LLM provider name (e.g. "gemini", "openai"). Default: "gemini".
    pub provider_name: String,

    /// Model identifier. Default: "gemini-2.0-flash".
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to copy what it sees, not improvise.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    ///
    /// A full multi-page card statement in one batch call can run past
    /// 4 000 output tokens of JSON; a reply cut short here is what the
    /// truncation repair in [`crate::pipeline::repair`] recovers from.
    pub max_tokens: usize,

    /// Retry policy for transient AI failures.
    pub retry: RetryPolicy,

    /// Per-AI-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Ledger statements with more pages than this are sent page by page.
    /// Default: 3.
    pub per_page_threshold: usize,

    /// File name of the consolidated workbook. Default: "Extractos_Consolidados.xlsx".
    pub output_file_name: String,

    /// Receives a status line at every pipeline step.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::new(),
            password: String::new(),
            api_key: String::new(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            retry: RetryPolicy::default(),
            api_timeout_secs: 120,
            per_page_threshold: 3,
            output_file_name: DEFAULT_OUTPUT_FILE_NAME.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("folder", &self.folder)
            .field("password", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("per_page_threshold", &self.per_page_threshold)
            .field("output_file_name", &self.output_file_name)
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Where the consolidated workbook is written.
    pub fn output_path(&self) -> PathBuf {
        self.folder.join(&self.output_file_name)
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.config.folder = folder.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay = Duration::from_millis(ms);
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay = Duration::from_millis(ms);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn per_page_threshold(mut self, pages: usize) -> Self {
        self.config.per_page_threshold = pages;
        self
    }

    pub fn output_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_file_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, ExtractorError> {
        let c = &self.config;
        if c.folder.as_os_str().is_empty() {
            return Err(ExtractorError::InvalidConfig(
                "A statement folder is required".into(),
            ));
        }
        if c.password.is_empty() {
            return Err(ExtractorError::InvalidConfig(
                "The statement password is required".into(),
            ));
        }
        if c.api_key.trim().chars().count() < MIN_API_KEY_LEN {
            return Err(ExtractorError::InvalidConfig(format!(
                "API key looks truncated: expected at least {MIN_API_KEY_LEN} characters"
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(ExtractorError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.retry.base_delay > c.retry.max_delay {
            return Err(ExtractorError::InvalidConfig(format!(
                "retry backoff {}ms exceeds its cap {}ms",
                c.retry.base_delay.as_millis(),
                c.retry.max_delay.as_millis()
            )));
        }
        let name = c.output_file_name.to_ascii_lowercase();
        if !name.ends_with(".xlsx") || name.contains(['/', '\\']) {
            return Err(ExtractorError::InvalidConfig(format!(
                "output file name must be a bare *.xlsx name, got '{}'",
                c.output_file_name
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSy-0123456789abcdefghijklmnop";

    fn base() -> ExtractorConfigBuilder {
        ExtractorConfig::builder()
            .folder("/tmp/statements")
            .password("secret")
            .api_key(KEY)
    }

    #[test]
    fn defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.provider_name, "gemini");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.per_page_threshold, 3);
        assert_eq!(
            config.output_path(),
            PathBuf::from("/tmp/statements/Extractos_Consolidados.xlsx")
        );
    }

    #[test]
    fn short_api_key_rejected() {
        let err = base().api_key("abc").build().unwrap_err();
        assert!(err.to_string().contains("API key"), "got: {err}");
    }

    #[test]
    fn missing_password_rejected() {
        assert!(base().password("").build().is_err());
    }

    #[test]
    fn missing_folder_rejected() {
        let err = ExtractorConfig::builder()
            .password("x")
            .api_key(KEY)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("folder"));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(base().max_attempts(0).build().is_err());
    }

    #[test]
    fn output_name_must_be_xlsx() {
        assert!(base().output_file_name("out.csv").build().is_err());
        assert!(base().output_file_name("../out.xlsx").build().is_err());
        assert!(base().output_file_name("Resumen.XLSX").build().is_ok());
    }

    #[test]
    fn long_backoff_needs_a_raised_cap() {
        let err = base().retry_backoff_ms(15_000).build().unwrap_err();
        assert!(err.to_string().contains("exceeds its cap"), "got: {err}");

        let config = base()
            .retry_backoff_ms(15_000)
            .max_backoff_ms(60_000)
            .build()
            .unwrap();
        assert_eq!(config.retry.delay_after(1), Duration::from_secs(15));
        assert_eq!(config.retry.delay_after(5), Duration::from_secs(60));
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1200),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1200));
        assert_eq!(policy.delay_after(9), Duration::from_millis(1200));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = base().build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains(KEY));
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
