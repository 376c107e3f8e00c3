//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! Secrets (bearer tokens, API keys, index passwords) are never stored in
//! the file; the config only names the environment variables that hold
//! them.
//!
//! ```toml
//! [db]
//! path = "./data/pdfchat.sqlite"
//!
//! [embedding]
//! provider = "vertex"
//! url = "https://us-central1-aiplatform.googleapis.com/v1/projects/p/locations/us-central1/publishers/google/models/multimodalembedding@001:predict"
//! token_command = ["gcloud", "auth", "print-access-token"]
//!
//! [index]
//! url = "http://localhost:9200"
//! name = "documents"
//! username = "elastic"
//! password_env = "ELASTIC_PASSWORD"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use pdfchat_core::chunk::{DEFAULT_STRIDE_CHARS, DEFAULT_WINDOW_CHARS};
use pdfchat_core::conversation::DEFAULT_LANGUAGE;
use pdfchat_core::prompt::{DEFAULT_CONTINUATION_TEMPLATE, DEFAULT_INIT_QUESTION_TEMPLATE};
use pdfchat_core::store::{SearchParams, DEFAULT_SEARCH_K};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_stride_chars")]
    pub stride_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: DEFAULT_WINDOW_CHARS,
            stride_chars: DEFAULT_STRIDE_CHARS,
        }
    }
}

fn default_window_chars() -> usize {
    DEFAULT_WINDOW_CHARS
}
fn default_stride_chars() -> usize {
    DEFAULT_STRIDE_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_concurrent_documents: default_max_concurrent_documents(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_max_concurrent_documents() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Endpoint URL. Required for `vertex`; `openai` defaults to the public API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding a ready bearer token (`vertex`).
    #[serde(default)]
    pub token_env: Option<String>,
    /// Command printing a bearer token on stdout (`vertex`), run per request.
    #[serde(default)]
    pub token_command: Option<Vec<String>>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            model: None,
            token_env: None,
            token_command: None,
            api_key_env: default_openai_key_env(),
            timeout_secs: default_timeout_secs(),
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
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_url")]
    pub url: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            name: default_index_name(),
            vector_field: default_vector_field(),
            username: None,
            password_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_index_name() -> String {
    "documents".to_string()
}
fn default_vector_field() -> String {
    "embedding".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_k")]
    pub num_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_SEARCH_K,
            num_candidates: DEFAULT_SEARCH_K,
        }
    }
}

impl RetrievalConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            k: self.k,
            num_candidates: self.num_candidates,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_SEARCH_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            model: default_completion_model(),
            api_key_env: default_openai_key_env(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptsConfig {
    #[serde(default = "default_init_question")]
    pub init_question: String,
    #[serde(default = "default_continuation")]
    pub continuation: String,
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            init_question: default_init_question(),
            continuation: default_continuation(),
            default_language: default_language(),
        }
    }
}

fn default_init_question() -> String {
    DEFAULT_INIT_QUESTION_TEMPLATE.to_string()
}
fn default_continuation() -> String {
    DEFAULT_CONTINUATION_TEMPLATE.to_string()
}
fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    let chunking = &config.chunking;
    if chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if chunking.stride_chars == 0 || chunking.stride_chars > chunking.window_chars {
        anyhow::bail!(
            "chunking.stride_chars must be between 1 and chunking.window_chars ({})",
            chunking.window_chars
        );
    }

    // Validate ingest
    if config.ingest.max_concurrent_documents == 0 {
        anyhow::bail!("ingest.max_concurrent_documents must be >= 1");
    }

    // Validate retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.num_candidates < config.retrieval.k {
        anyhow::bail!(
            "retrieval.num_candidates ({}) must be >= retrieval.k ({})",
            config.retrieval.num_candidates,
            config.retrieval.k
        );
    }

    // Validate timeouts
    for (name, secs) in [
        ("embedding.timeout_secs", config.embedding.timeout_secs),
        ("index.timeout_secs", config.index.timeout_secs),
        ("completion.timeout_secs", config.completion.timeout_secs),
    ] {
        if secs == 0 {
            anyhow::bail!("{} must be > 0", name);
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" => {}
        "vertex" => {
            if embedding.url.is_none() {
                anyhow::bail!("embedding.url must be specified when provider is 'vertex'");
            }
            let has_command = embedding
                .token_command
                .as_ref()
                .is_some_and(|c| !c.is_empty());
            if embedding.token_env.is_none() && !has_command {
                anyhow::bail!(
                    "embedding.token_env or embedding.token_command must be specified when provider is 'vertex'"
                );
            }
        }
        "openai" => {
            if embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, vertex, or openai.",
            other
        ),
    }

    Ok(())
}
