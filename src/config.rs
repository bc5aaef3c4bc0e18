//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! After parsing, a handful of environment variables override the file
//! (see [`apply_env_overrides`]), then [`load_config`] validates the result.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}
fn default_tokenizer() -> String {
    "cl100k".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model name with the provider default filled in.
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider.as_str()) {
            (Some(m), _) => m.clone(),
            (None, "openai") => "text-embedding-3-small".to_string(),
            (None, "local") => "all-minilm-l6-v2".to_string(),
            (None, _) => "mxbai-embed-large".to_string(),
        }
    }

    /// Known dimensionality for the configured model, if any.
    pub fn resolved_dims(&self) -> Option<usize> {
        self.dims.or(match self.model_name().as_str() {
            "mxbai-embed-large" => Some(1024),
            "nomic-embed-text" => Some(768),
            "all-minilm" | "all-minilm-l6-v2" => Some(384),
            "text-embedding-3-small" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        })
    }

    pub fn base_url(&self) -> String {
        provider_url(&self.provider, self.url.as_deref())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "ollama".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}
fn default_completion_timeout_secs() -> u64 {
    120
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn model_name(&self) -> String {
        match (&self.model, self.provider.as_str()) {
            (Some(m), _) => m.clone(),
            (None, "openai") => "gpt-4o-mini".to_string(),
            (None, _) => "llama3.2".to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        provider_url(&self.provider, self.url.as_deref())
    }
}

fn provider_url(provider: &str, configured: Option<&str>) -> String {
    let url = match (configured, provider) {
        (Some(u), _) => u,
        (None, "openai") => DEFAULT_OPENAI_URL,
        (None, _) => DEFAULT_OLLAMA_URL,
    };
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_turns: default_max_turns(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    1800
}
fn default_max_turns() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration for a database at `path` with every other section at
    /// its default.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            sessions: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply `OLLAMA_EMBED_MODEL`, `OLLAMA_MODEL` and `OLLAMA_HOST`.
///
/// `lookup` abstracts the environment so tests need not mutate it.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(model) = non_empty("OLLAMA_EMBED_MODEL") {
        config.embedding.model = Some(model);
    }
    if let Some(model) = non_empty("OLLAMA_MODEL") {
        config.completion.model = Some(model);
    }
    if let Some(host) = non_empty("OLLAMA_HOST") {
        if config.embedding.provider == "ollama" {
            config.embedding.url = Some(host.clone());
        }
        if config.completion.provider == "ollama" {
            config.completion.url = Some(host);
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be less than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }
    match config.chunking.tokenizer.as_str() {
        "cl100k" | "whitespace" => {}
        other => bail!(
            "Unknown tokenizer: '{}'. Must be cl100k or whitespace.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    let threshold = config.retrieval.threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        bail!("retrieval.threshold must be in [0.0, 1.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    let temperature = config.completion.temperature;
    if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
        bail!("completion.temperature must be in [0.0, 2.0]");
    }

    if config.sessions.max_turns == 0 {
        bail!("sessions.max_turns must be >= 1");
    }

    Ok(())
}
