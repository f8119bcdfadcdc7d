use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language of the templates (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target catalog language (ISO code, optionally with a region: `pt-BR`)
    #[serde(default = "default_language")]
    pub language: String,

    /// Pipeline mode
    #[serde(default)]
    pub mode: PipelineMode,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Quality pipeline config
    #[serde(default)]
    pub quality: QualityConfig,

    /// Context sources
    #[serde(default)]
    pub context: ContextConfig,

    /// Where review records are appended (JSON lines); logged only when unset
    #[serde(default)]
    pub review_output: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// How translated batches are accepted
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Backend output is applied as-is
    #[default]
    Direct,
    /// Backend output passes regional review and scoring before it is applied
    Quality,
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Google Gemini
    #[default]
    Gemini,
    // @provider: Groq (OpenAI-compatible)
    Groq,
    // @provider: OpenRouter (OpenAI-compatible)
    OpenRouter,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama
    Ollama,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
    // @provider: Offline deterministic backend
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::Groq => "Groq",
            Self::OpenRouter => "OpenRouter",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
            Self::LMStudio => "LM Studio",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::Groq => "groq".to_string(),
            Self::OpenRouter => "openrouter".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Ollama => "ollama".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }

    // @returns: Whether requests must carry an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama | Self::LMStudio | Self::Mock)
    }

    // @returns: Every provider, in default table order
    pub fn all() -> [TranslationProvider; 8] {
        [
            Self::Gemini,
            Self::Groq,
            Self::OpenRouter,
            Self::OpenAI,
            Self::Anthropic,
            Self::Ollama,
            Self::LMStudio,
            Self::Mock,
        ]
    }
}

// Implement Display trait for TranslationProvider
impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TranslationProvider
impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "lmstudio" => Ok(Self::LMStudio),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_timeout_secs(),
            rate_limit: default_rate_limit(provider_type),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Batching, retry and timeout settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Entries per backend call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts for a whole batch before falling back to single entries
    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,

    /// Attempts for a single entry before it is recorded as failed
    #[serde(default = "default_max_single_retries")]
    pub max_single_retries: u32,

    /// Base backoff in seconds, doubled on each retry
    #[serde(default = "default_retry_wait_seconds")]
    pub retry_wait_seconds: u64,

    /// Upper bound for a single backoff wait
    #[serde(default = "default_max_retry_wait_seconds")]
    pub max_retry_wait_seconds: u64,

    /// Deadline for one backend call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for one catalog write
    #[serde(default = "default_persist_timeout_secs")]
    pub persist_timeout_secs: u64,

    /// Batches in flight at once (1 to 4)
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Temperature parameter for text generation (0.0 to 1.0)
    /// Lower values make output more deterministic, higher values more creative
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_retries: default_max_batch_retries(),
            max_single_retries: default_max_single_retries(),
            retry_wait_seconds: default_retry_wait_seconds(),
            max_retry_wait_seconds: default_max_retry_wait_seconds(),
            request_timeout_secs: default_request_timeout_secs(),
            persist_timeout_secs: default_persist_timeout_secs(),
            max_concurrent_batches: default_max_concurrent_batches(),
            temperature: default_temperature(),
        }
    }
}

/// Quality pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QualityConfig {
    /// Minimum score for automatic approval
    #[serde(default = "default_quality_threshold")]
    pub threshold: f32,

    /// Smallest accepted translation/source length ratio
    #[serde(default = "default_min_length_ratio")]
    pub min_length_ratio: f32,

    /// Largest accepted translation/source length ratio
    #[serde(default = "default_max_length_ratio")]
    pub max_length_ratio: f32,

    /// Regional profile (JSON)
    #[serde(default)]
    pub profile: Option<PathBuf>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: default_quality_threshold(),
            min_length_ratio: default_min_length_ratio(),
            max_length_ratio: default_max_length_ratio(),
            profile: None,
        }
    }
}

/// Files feeding the context bundle
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ContextConfig {
    /// Global standardization guide (text)
    #[serde(default)]
    pub guide: Option<PathBuf>,

    /// Application guide (text)
    #[serde(default)]
    pub app_guide: Option<PathBuf>,

    /// Language guide (text)
    #[serde(default)]
    pub language_guide: Option<PathBuf>,

    /// Glossary terms (JSON)
    #[serde(default)]
    pub glossary: Option<PathBuf>,

    /// Term correction rules (JSON)
    #[serde(default)]
    pub corrections: Option<PathBuf>,

    /// Learned full-translation corrections (JSON)
    #[serde(default)]
    pub learned_examples: Option<PathBuf>,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<&LogLevel> for log::LevelFilter {
    fn from(level: &LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Hard limit on in-flight batches
pub const MAX_CONCURRENT_BATCHES: usize = 4;

fn default_source_language() -> String {
    "en".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_max_batch_retries() -> u32 {
    3
}

fn default_max_single_retries() -> u32 {
    2
}

fn default_retry_wait_seconds() -> u64 {
    2
}

fn default_max_retry_wait_seconds() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_persist_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_batches() -> usize {
    1
}

fn default_temperature() -> f32 {
    0.3
}

fn default_quality_threshold() -> f32 {
    0.8
}

fn default_min_length_ratio() -> f32 {
    0.3
}

fn default_max_length_ratio() -> f32 {
    3.0
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Gemini => "gemini-2.5-flash",
        TranslationProvider::Groq => "llama-3.3-70b-versatile",
        TranslationProvider::OpenRouter => "deepseek/deepseek-chat-v3-0324:free",
        TranslationProvider::OpenAI => "gpt-4o-mini",
        TranslationProvider::Anthropic => "claude-3-5-haiku-latest",
        TranslationProvider::Ollama => "llama3.2:3b",
        // Placeholder; users should set to the loaded model name in LM Studio
        TranslationProvider::LMStudio => "local-model",
        TranslationProvider::Mock => "mock",
    }
    .to_string()
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        TranslationProvider::Groq => "https://api.groq.com/openai/v1",
        TranslationProvider::OpenRouter => "https://openrouter.ai/api/v1",
        TranslationProvider::OpenAI => "https://api.openai.com/v1",
        TranslationProvider::Anthropic => "https://api.anthropic.com",
        TranslationProvider::Ollama => "http://localhost:11434",
        TranslationProvider::LMStudio => "http://localhost:1234/v1",
        TranslationProvider::Mock => "",
    }
    .to_string()
}

// Local providers are not rate limited by default
fn default_rate_limit(provider: TranslationProvider) -> Option<u32> {
    match provider {
        TranslationProvider::Gemini => Some(15),
        TranslationProvider::Groq => Some(30),
        TranslationProvider::OpenRouter => Some(20),
        TranslationProvider::OpenAI => Some(60),
        TranslationProvider::Anthropic => Some(45),
        TranslationProvider::Ollama | TranslationProvider::LMStudio | TranslationProvider::Mock => None,
    }
}

impl Config {
    /// Load the configuration at `path`, writing a default one first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.language)?;

        let common = &self.translation.common;
        if common.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if common.max_batch_retries == 0 || common.max_single_retries == 0 {
            return Err(anyhow!("Retry counts must be at least 1"));
        }
        if common.max_concurrent_batches == 0 || common.max_concurrent_batches > MAX_CONCURRENT_BATCHES {
            return Err(anyhow!(
                "max_concurrent_batches must be between 1 and {}",
                MAX_CONCURRENT_BATCHES
            ));
        }
        if common.request_timeout_secs == 0 || common.persist_timeout_secs == 0 {
            return Err(anyhow!("Timeouts must be at least one second"));
        }

        let quality = &self.quality;
        if !(0.0..=1.0).contains(&quality.threshold) {
            return Err(anyhow!("Quality threshold must be between 0.0 and 1.0"));
        }
        if quality.min_length_ratio <= 0.0 || quality.min_length_ratio >= quality.max_length_ratio {
            return Err(anyhow!("Length ratio bounds must satisfy 0 < min < max"));
        }

        // Validate API key for remote providers
        let provider = self.translation.provider;
        if provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider",
                provider.display_name()
            ));
        }

        let endpoint = self.translation.get_endpoint();
        if provider != TranslationProvider::Mock {
            url::Url::parse(&endpoint)
                .with_context(|| format!("Invalid endpoint for {}: {}", provider.display_name(), endpoint))?;
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            language: default_language(),
            mode: PipelineMode::default(),
            translation: TranslationConfig::default(),
            quality: QualityConfig::default(),
            context: ContextConfig::default(),
            review_output: None,
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider configuration, created on demand
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(position) => position,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[position]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }
        default_model(self.provider)
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }
        String::new()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }
        default_endpoint(self.provider)
    }

    /// Get the HTTP client timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|t| *t > 0)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        if let Some(provider_config) = self.get_active_provider_config() {
            return provider_config.rate_limit;
        }
        default_rate_limit(self.provider)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: TranslationProvider::all()
                .into_iter()
                .map(ProviderConfig::new)
                .collect(),
            common: TranslationCommonConfig::default(),
        }
    }
}
