
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub generation_model: String,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.1:8b".to_string(),
            embedding_dimension: 768,
            timeout_secs: 60,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string; the `DATABASE_URL` environment variable wins when set
    pub url: Option<String>,
    pub max_connections: u32,
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            statement_timeout_ms: 30_000,
        }
    }
}

/// Named batch-embedding presets selectable at runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceProfile {
    Fast,
    #[default]
    Balanced,
    Safe,
}

impl fmt::Display for PerformanceProfile {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Safe => write!(f, "safe"),
        }
    }
}

impl FromStr for PerformanceProfile {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "safe" => Ok(Self::Safe),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Resolved batch-embedding parameters, passed explicitly to every batch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingProfile {
    pub batch_size: usize,
    pub max_workers: usize,
    pub delay: Duration,
    pub retry_count: u32,
    pub backoff_base: Duration,
    pub max_text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub profile: PerformanceProfile,
    pub max_text_chars: usize,
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            profile: PerformanceProfile::Balanced,
            max_text_chars: 5000,
            backoff_base_ms: 500,
        }
    }
}

impl EmbeddingConfig {
    /// Parameters of the configured profile
    #[inline]
    pub fn resolved(&self) -> EmbeddingProfile {
        self.with_profile(self.profile)
    }

    /// Parameters of `profile`, keeping this config's truncation and backoff settings
    #[inline]
    pub fn with_profile(&self, profile: PerformanceProfile) -> EmbeddingProfile {
        let (batch_size, max_workers, delay_ms) = match profile {
            PerformanceProfile::Fast => (100, 20, 20),
            PerformanceProfile::Balanced => (50, 10, 50),
            PerformanceProfile::Safe => (20, 5, 100),
        };

        EmbeddingProfile {
            batch_size,
            max_workers,
            delay: Duration::from_millis(delay_ms),
            retry_count: 3,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_text_chars: self.max_text_chars,
        }
    }
}

/// A `(table, column)` pair whose free-text values carry their own sub-index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextSearchTarget {
    pub table: String,
    pub column: String,
}

impl TextSearchTarget {
    #[inline]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for TextSearchTarget {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionRewrite {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub schema_path: PathBuf,
    pub top_k: usize,
    pub text_top_k: usize,
    pub rewrites: Vec<QuestionRewrite>,
    pub text_search: Option<TextSearchTarget>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("schema.json"),
            top_k: 10,
            text_top_k: 5,
            rewrites: Vec::new(),
            text_search: Some(TextSearchTarget::new("event", "description")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub shared_store: bool,
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            shared_store: false,
            namespace: "sql_cache".to_string(),
        }
    }
}

impl CacheConfig {
    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_sql_retries: u32,
    pub history_turns: usize,
    pub context_excerpt_chars: usize,
    pub result_preview_chars: usize,
    /// Opt-in column-name repair after "column does not exist" errors
    pub auto_fix_columns: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_sql_retries: 3,
            history_turns: 4,
            context_excerpt_chars: 1000,
            result_preview_chars: 200,
            auto_fix_columns: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid max connections: {0} (must be between 1 and 100)")]
    InvalidMaxConnections(u32),
    #[error("Invalid max text length: {0} (must be between 100 and 100000 characters)")]
    InvalidMaxTextChars(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid SQL retry budget: {0} (must be between 1 and 10)")]
    InvalidSqlRetries(u32),
    #[error("Invalid cache namespace: {0:?} (cannot be empty or contain ':')")]
    InvalidNamespace(String),
    #[error("Invalid rewrite pattern {pattern:?}: {message}")]
    InvalidRewrite { pattern: String, message: String },
    #[error("Invalid text search target: {0} (identifiers must match [A-Za-z_][A-Za-z0-9_]*)")]
    InvalidTextSearchTarget(String),
    #[error("Unknown performance profile: {0}. Use 'fast', 'balanced', or 'safe'")]
    UnknownProfile(String),
    #[error("No database URL configured: set {DATABASE_URL_ENV} or database.url in config.toml")]
    MissingDatabaseUrl,
    #[error("Schema description not found: {0}")]
    MissingSchemaFile(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Defaults rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            generation: GenerationConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
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

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// `~/.safety-rag`
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".safety-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_database()?;
        self.validate_embedding()?;
        self.validate_retrieval()?;
        self.validate_cache()?;

        if !(1..=10).contains(&self.generation.max_sql_retries) {
            return Err(ConfigError::InvalidSqlRetries(
                self.generation.max_sql_retries,
            ));
        }

        Ok(())
    }

    fn validate_database(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.database.max_connections) {
            return Err(ConfigError::InvalidMaxConnections(
                self.database.max_connections,
            ));
        }
        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        if !(100..=100_000).contains(&self.embedding.max_text_chars) {
            return Err(ConfigError::InvalidMaxTextChars(
                self.embedding.max_text_chars,
            ));
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        for top_k in [retrieval.top_k, retrieval.text_top_k] {
            if !(1..=100).contains(&top_k) {
                return Err(ConfigError::InvalidTopK(top_k));
            }
        }

        if let Some(target) = &retrieval.text_search {
            if !is_identifier(&target.table) || !is_identifier(&target.column) {
                return Err(ConfigError::InvalidTextSearchTarget(target.to_string()));
            }
        }

        for rewrite in &retrieval.rewrites {
            fancy_regex::Regex::new(&format!("(?i){}", rewrite.pattern)).map_err(|e| {
                ConfigError::InvalidRewrite {
                    pattern: rewrite.pattern.clone(),
                    message: e.to_string(),
                }
            })?;
        }

        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        let namespace = &self.cache.namespace;
        if namespace.trim().is_empty() || namespace.contains(':') {
            return Err(ConfigError::InvalidNamespace(namespace.clone()));
        }
        Ok(())
    }

    /// Resolve the PostgreSQL connection string. `env_value` is the content of
    /// `DATABASE_URL`, read by the caller.
    #[inline]
    pub fn database_url(&self, env_value: Option<String>) -> Result<String, ConfigError> {
        env_value
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.database.url.clone())
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Schema description file; relative paths resolve against the base directory
    #[inline]
    pub fn schema_path(&self) -> PathBuf {
        if self.retrieval.schema_path.is_absolute() {
            self.retrieval.schema_path.clone()
        } else {
            self.get_base_dir().join(&self.retrieval.schema_path)
        }
    }

    /// Fails when the schema description file is absent
    #[inline]
    pub fn require_schema_file(&self) -> Result<PathBuf, ConfigError> {
        let path = self.schema_path();
        if path.is_file() {
            Ok(path)
        } else {
            Err(ConfigError::MissingSchemaFile(path))
        }
    }

    #[inline]
    pub fn schema_index_path(&self) -> PathBuf {
        self.get_base_dir().join("schema_index")
    }

    #[inline]
    pub fn text_index_path(&self) -> PathBuf {
        self.get_base_dir().join("text_indexes")
    }

    #[inline]
    pub fn embedding_cache_path(&self) -> PathBuf {
        self.get_base_dir().join("embedding_cache.json")
    }

    #[inline]
    pub fn query_cache_path(&self) -> PathBuf {
        self.get_base_dir().join("query_cache.db")
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for model in [&self.embedding_model, &self.generation_model] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
#[inline]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
