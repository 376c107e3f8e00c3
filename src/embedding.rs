//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `embedding.provider`:
//! - **[`VertexEmbedder`]** (`vertex`): Vertex AI `:predict` endpoint,
//!   `{instances: [{text}]}` → `predictions[0].textEmbedding`.
//! - **[`OpenAiEmbedder`]** (`openai`): `POST /v1/embeddings`,
//!   `{model, input: [text]}` → `data[0].embedding`.
//! - **[`DisabledEmbedder`]** (`disabled`): every call fails.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use pdfchat::config::EmbeddingConfig;
//! # use pdfchat::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! One request is sent per text. A response without predictions is a
//! [`RagError::BackendSemantic`] failure, never an empty vector.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use pdfchat_core::embedding::Embedder;
use pdfchat_core::error::{RagError, Stage};

use crate::config::EmbeddingConfig;
use crate::http;

const DEFAULT_VERTEX_MODEL: &str = "multimodalembedding@001";
const DEFAULT_OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "vertex" => Ok(Arc::new(VertexEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`; every call fails with a
/// descriptive error.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f64>, RagError> {
        Err(RagError::transport(
            Stage::Embed,
            "embedding provider is disabled; set [embedding] provider in the config",
        ))
    }
}

// ============ Vertex AI Provider ============

/// Where the Vertex bearer token comes from.
#[derive(Debug, Clone, PartialEq)]
enum TokenSource {
    Env(String),
    Command(Vec<String>),
}

pub struct VertexEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    token: TokenSource,
    timeout: Duration,
}

impl VertexEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for Vertex provider"))?;
        let token = match (&config.token_env, &config.token_command) {
            (Some(var), _) => TokenSource::Env(var.clone()),
            (None, Some(cmd)) if !cmd.is_empty() => TokenSource::Command(cmd.clone()),
            _ => bail!("embedding.token_env or embedding.token_command required for Vertex provider"),
        };
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_VERTEX_MODEL.to_string()),
            token,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn bearer(&self) -> Result<String, RagError> {
        match &self.token {
            TokenSource::Env(var) => http::env_secret(Stage::Embed, var),
            TokenSource::Command(argv) => run_token_command(argv, self.timeout).await,
        }
    }
}

/// Run the token command, killing it if it outlives `timeout`.
async fn run_token_command(argv: &[String], timeout: Duration) -> Result<String, RagError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| RagError::transport(Stage::Embed, "empty token command"))?;
    let child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| {
            RagError::transport(
                Stage::Embed,
                format!("token command {} timed out after {}s", program, timeout.as_secs()),
            )
        })?
        .map_err(|e| {
            RagError::transport(Stage::Embed, format!("failed to run {}: {}", program, e))
        })?;
    if !output.status.success() {
        return Err(RagError::transport(
            Stage::Embed,
            format!(
                "token command {} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(RagError::transport(
            Stage::Embed,
            format!("token command {} printed no token", program),
        ));
    }
    Ok(token)
}

#[async_trait]
impl Embedder for VertexEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>, RagError> {
        let token = self.bearer().await?;
        let body = serde_json::json!({ "instances": [{ "text": text }] });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(Stage::Embed, e))?;
        let json = http::read_json(Stage::Embed, response).await?;
        parse_vertex_response(&json)
    }
}

/// Extract `predictions[0].textEmbedding`.
pub fn parse_vertex_response(json: &Value) -> Result<Vec<f64>, RagError> {
    let predictions = json
        .get("predictions")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RagError::semantic(Stage::Embed, "response has no predictions array"))?;
    let first = predictions
        .first()
        .ok_or_else(|| RagError::semantic(Stage::Embed, "response contained no predictions"))?;
    let embedding = first
        .get("textEmbedding")
        .ok_or_else(|| RagError::semantic(Stage::Embed, "prediction has no textEmbedding"))?;
    number_array(embedding, "textEmbedding")
}

// ============ OpenAI Provider ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key_env: String,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;

        if std::env::var(&config.api_key_env).is_err() {
            bail!("{} environment variable not set", config.api_key_env);
        }

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDINGS_URL.to_string()),
            model,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>, RagError> {
        let api_key = http::env_secret(Stage::Embed, &self.api_key_env)?;
        let body = serde_json::json!({ "model": self.model, "input": [text] });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(Stage::Embed, e))?;
        let json = http::read_json(Stage::Embed, response).await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding`.
pub fn parse_openai_response(json: &Value) -> Result<Vec<f64>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::semantic(Stage::Embed, "response has no data array"))?;
    let first = data
        .first()
        .ok_or_else(|| RagError::semantic(Stage::Embed, "response contained no embeddings"))?;
    let embedding = first
        .get("embedding")
        .ok_or_else(|| RagError::semantic(Stage::Embed, "data entry has no embedding"))?;
    number_array(embedding, "embedding")
}

fn number_array(value: &Value, field: &str) -> Result<Vec<f64>, RagError> {
    let items = value
        .as_array()
        .ok_or_else(|| RagError::semantic(Stage::Embed, format!("{} is not an array", field)))?;
    if items.is_empty() {
        return Err(RagError::semantic(
            Stage::Embed,
            format!("{} is empty", field),
        ));
    }
    items
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                RagError::semantic(Stage::Embed, format!("{} contains a non-number", field))
            })
        })
        .collect()
}
