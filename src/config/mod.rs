
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable checked first for the API key. The fallback is the
/// conventional `OPENAI_API_KEY`.
pub const API_KEY_ENV: &str = "OPENAI_KEY";
const API_KEY_ENV_FALLBACK: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Row cap suggested to the model for plain (non-visualization) answers.
    pub top_k: u32,
    /// Number of few-shot examples retrieved per question.
    pub retrieval_k: u32,
    /// Hard bound on tool calls within a single user turn.
    pub max_tool_calls: u32,
    /// Reject generated statements that are not SELECT before execution.
    /// Turning this off restores the advisory, instruction-only policy.
    pub enforce_select_only: bool,
}

impl Default for AgentConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            retrieval_k: 5,
            max_tool_calls: 6,
            enforce_select_only: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("API key not found: {0} is not set")]
    MissingApiKey(&'static str),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(u32),
    #[error("Invalid retrieval_k: {0} (must be between 1 and 50)")]
    InvalidRetrievalK(u32),
    #[error("Invalid max_tool_calls: {0} (must be between 1 and 32)")]
    InvalidMaxToolCalls(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                openai: OpenAiConfig::default(),
                agent: AgentConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;

        if !(1..=100).contains(&self.agent.top_k) {
            return Err(ConfigError::InvalidTopK(self.agent.top_k));
        }
        if !(1..=50).contains(&self.agent.retrieval_k) {
            return Err(ConfigError::InvalidRetrievalK(self.agent.retrieval_k));
        }
        if !(1..=32).contains(&self.agent.max_tool_calls) {
            return Err(ConfigError::InvalidMaxToolCalls(self.agent.max_tool_calls));
        }

        Ok(())
    }

    /// Path of the SQLite exercise log.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("physio.db")
    }

    /// API key from the environment. Never persisted in the config file.
    #[inline]
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_ENV_FALLBACK))
            .map_err(|_| ConfigError::MissingApiKey(API_KEY_ENV))
    }
}

impl OpenAiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }
        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))
    }
}

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::DirectoryError)?
        .join("physio-chat");
    fs::create_dir_all(&dir).map_err(|_| ConfigError::DirectoryError)?;
    Ok(dir)
}
