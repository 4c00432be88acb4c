//! Configuration parsing and validation.
//!
//! Visa Assist is configured via a TOML file (default: `config/visa.toml`).
//! The file is parsed into a [`Config`] struct and validated eagerly by
//! [`load_config`], so misconfiguration fails before any work starts.
//!
//! # Example
//!
//! ```toml
//! [dataset]
//! path = "data/passport-index-tidy-iso3.csv"
//!
//! [store]
//! path = "data/visa_vectorstore"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [retrieval]
//! k = 5
//! fetch_k = 20
//! diversity_lambda = 0.7
//!
//! [conversation]
//! path = "data/conversations.sqlite"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use visa_assist_core::models::DEFAULT_SOURCE_TAG;
use visa_assist_core::retrieval::{
    SearchParams, DEFAULT_DIVERSITY_LAMBDA, DEFAULT_FETCH_K, DEFAULT_K,
};

/// Root configuration, one field per TOML section.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub intent: IntentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    /// CSV file with header `Passport,Destination,Requirement`.
    pub path: PathBuf,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
    /// Rejected rows tolerated before a build fails.
    #[serde(default)]
    pub max_rejected_rows: usize,
}

fn default_source_tag() -> String {
    DEFAULT_SOURCE_TAG.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding `vectors.sqlite`.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_diversity_lambda")]
    pub diversity_lambda: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fetch_k: DEFAULT_FETCH_K,
            diversity_lambda: DEFAULT_DIVERSITY_LAMBDA,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            k: self.k,
            fetch_k: self.fetch_k,
            diversity_lambda: self.diversity_lambda,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}
fn default_fetch_k() -> usize {
    DEFAULT_FETCH_K
}
fn default_diversity_lambda() -> f64 {
    DEFAULT_DIVERSITY_LAMBDA
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// SQLite file holding the message log.
    pub path: PathBuf,
    /// Rolling window of human/assistant messages passed to the LLM.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

fn default_max_history_messages() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: default_llm_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntentConfig {
    /// `keyword` (offline, deterministic) or `llm`.
    #[serde(default = "default_classifier")]
    pub classifier: String,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            classifier: default_classifier(),
        }
    }
}

fn default_classifier() -> String {
    "keyword".to_string()
}

/// Parse configuration from a TOML string and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse, and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.diversity_lambda) {
        anyhow::bail!("retrieval.diversity_lambda must be in [0.0, 1.0]");
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.llm.model.is_none() {
                anyhow::bail!("llm.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Intent
    match config.intent.classifier.as_str() {
        "keyword" => {}
        "llm" => {
            if !config.llm.is_enabled() {
                anyhow::bail!("intent.classifier = 'llm' requires an enabled [llm] provider");
            }
        }
        other => anyhow::bail!(
            "Unknown intent classifier: '{}'. Must be keyword or llm.",
            other
        ),
    }

    Ok(())
}
