use crate::error::{Error, Result};
use crate::provider::ProviderKind;
use crate::token::TokenizerKind;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_LINES: usize = 200;
const DEFAULT_MAX_TOKENS: usize = 4_096;
const DEFAULT_LOOKBACK_LINES: usize = 20;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_BACKUP_SUFFIX: &str = "bak";

/// Configuration for a debloat run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// File to debloat
    pub source_path: PathBuf,

    /// Provider performing the rewrite
    pub provider: ProviderKind,

    /// Model id overriding the provider default
    pub model: Option<String>,

    /// Base URL overriding the provider default
    pub endpoint: Option<String>,

    /// API key for remote providers
    pub api_key: Option<String>,

    /// Maximum physical lines per chunk
    pub max_lines: usize,

    /// Maximum estimated tokens per chunk
    pub max_tokens: usize,

    /// How many lines back from the limit to search for a clean boundary
    pub lookback_lines: usize,

    /// Tokenizer used for estimates
    pub tokenizer: TokenizerKind,

    /// Per-request timeout for provider calls
    pub timeout: Duration,

    /// Extra attempts per chunk after a provider failure
    pub retries: u32,

    /// Sampling temperature overriding the provider default
    pub temperature: Option<f32>,

    /// User prompt template overriding the built-in one
    pub prompt_template: Option<PathBuf>,

    /// Extension appended to the source path for the backup
    pub backup_suffix: String,

    /// Run everything but never touch the filesystem
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_debloat::Config;
    ///
    /// let config = Config::builder()
    ///     .source_path("src/app.py")
    ///     .max_lines(150)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// The source file itself is checked when it is read, so a missing file
    /// surfaces as an input error rather than a configuration error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Chunk limits are zero or the lookback window is not below the line limit
    /// - Timeout is zero
    /// - A remote provider has no API key
    /// - The prompt template file does not exist
    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty() {
            return Err(Error::config("source_path must be set"));
        }

        if self.max_lines == 0 {
            return Err(Error::config("max_lines must be greater than 0"));
        }

        if self.max_tokens == 0 {
            return Err(Error::config("max_tokens must be greater than 0"));
        }

        if self.lookback_lines >= self.max_lines {
            return Err(Error::config(format!(
                "lookback_lines ({}) must be less than max_lines ({})",
                self.lookback_lines, self.max_lines
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than 0"));
        }

        if self.provider.requires_api_key()
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(Error::config(format!(
                "{} requires an API key (set {})",
                self.provider.display_name(),
                self.provider.api_key_env().unwrap_or("an API key")
            )));
        }

        if let Some(ref template) = self.prompt_template {
            if !template.is_file() {
                return Err(Error::config(format!(
                    "Prompt template does not exist: {}",
                    template.display()
                )));
            }
        }

        if self.backup_suffix.is_empty() || self.backup_suffix.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "Invalid backup suffix '{}'",
                self.backup_suffix
            )));
        }

        Ok(())
    }

    /// Returns the sibling path the original file is copied to.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.source_path.clone().into_os_string();
        name.push(".");
        name.push(&self.backup_suffix);
        PathBuf::from(name)
    }

    /// Returns the model id in effect for this run.
    #[must_use]
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Returns the base URL in effect for this run.
    #[must_use]
    pub fn effective_endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    /// Returns the sampling temperature in effect for this run.
    #[must_use]
    pub fn effective_temperature(&self) -> f32 {
        self.temperature
            .unwrap_or_else(|| self.provider.default_temperature())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            provider: ProviderKind::Local,
            model: None,
            endpoint: None,
            api_key: None,
            max_lines: DEFAULT_MAX_LINES,
            max_tokens: DEFAULT_MAX_TOKENS,
            lookback_lines: DEFAULT_LOOKBACK_LINES,
            tokenizer: TokenizerKind::Simple,
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            temperature: None,
            prompt_template: None,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            dry_run: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    source_path: Option<PathBuf>,
    provider: Option<ProviderKind>,
    model: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    max_lines: Option<usize>,
    max_tokens: Option<usize>,
    lookback_lines: Option<usize>,
    tokenizer: Option<TokenizerKind>,
    timeout: Option<Duration>,
    retries: u32,
    temperature: Option<f32>,
    prompt_template: Option<PathBuf>,
    backup_suffix: Option<String>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the file to debloat.
    #[must_use]
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Sets the rewrite provider.
    #[must_use]
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Overrides the provider's default model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the provider's default base URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the API key for remote providers.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the maximum physical lines per chunk.
    #[must_use]
    pub fn max_lines(mut self, lines: usize) -> Self {
        self.max_lines = Some(lines);
        self
    }

    /// Sets the maximum estimated tokens per chunk.
    #[must_use]
    pub fn max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Sets the boundary lookback window in lines.
    ///
    /// Defaults to 20, capped below the line limit.
    #[must_use]
    pub fn lookback_lines(mut self, lines: usize) -> Self {
        self.lookback_lines = Some(lines);
        self
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the per-request provider timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how many times a failed chunk is retried.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Overrides the provider's default sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets a Tera template file replacing the built-in user prompt.
    ///
    /// The template sees `code`, `fence`, `language`, `chunk_index`, `total_chunks`
    /// and `file_name`.
    #[must_use]
    pub fn prompt_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_template = Some(path.into());
        self
    }

    /// Sets the backup extension (without the leading dot).
    #[must_use]
    pub fn backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = Some(suffix.into());
        self
    }

    /// Enables dry run mode (no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let max_lines = self.max_lines.unwrap_or(DEFAULT_MAX_LINES);
        // The default window shrinks to fit small line limits
        let lookback_lines = self
            .lookback_lines
            .unwrap_or_else(|| DEFAULT_LOOKBACK_LINES.min(max_lines.saturating_sub(1)));

        let config = Config {
            source_path: self.source_path.unwrap_or_default(),
            provider: self.provider.unwrap_or(ProviderKind::Local),
            model: self.model,
            endpoint: self.endpoint,
            api_key: self.api_key,
            max_lines,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            lookback_lines,
            tokenizer: self.tokenizer.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            retries: self.retries,
            temperature: self.temperature,
            prompt_template: self.prompt_template,
            backup_suffix: self
                .backup_suffix
                .unwrap_or_else(|| DEFAULT_BACKUP_SUFFIX.to_string()),
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
