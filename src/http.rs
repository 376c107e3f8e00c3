//! Shared HTTP plumbing for the backend clients.
//!
//! Every client gets its own `reqwest::Client` with the timeout from its
//! config section. Status and payload failures are mapped onto
//! [`RagError`] with the calling stage; nothing here retries.

use std::time::Duration;

use anyhow::Result;
use pdfchat_core::error::{RagError, Stage};

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

pub fn transport(stage: Stage, err: reqwest::Error) -> RagError {
    RagError::transport(stage, err.to_string())
}

/// Check the status and decode the body as JSON.
///
/// Non-2xx statuses are transport failures; an undecodable body from a
/// successful response is a semantic failure.
pub async fn read_json(
    stage: Stage,
    response: reqwest::Response,
) -> Result<serde_json::Value, RagError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::transport(
            stage,
            format!("HTTP {}: {}", status, truncate(&body, 300)),
        ));
    }
    let bytes = response.bytes().await.map_err(|e| transport(stage, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RagError::semantic(stage, format!("invalid JSON body: {}", e)))
}

/// Same as [`read_json`] but discards the body of a successful response.
pub async fn expect_success(stage: Stage, response: reqwest::Response) -> Result<(), RagError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RagError::transport(
        stage,
        format!("HTTP {}: {}", status, truncate(&body, 300)),
    ))
}

/// Read a secret from the environment variable `name`.
pub fn env_secret(stage: Stage, name: &str) -> Result<String, RagError> {
    std::env::var(name)
        .map_err(|_| RagError::transport(stage, format!("{} environment variable not set", name)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
