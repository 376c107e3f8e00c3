//! OpenAI-compatible chat completion client.
//!
//! `POST {endpoint}` with `{model, messages: [{role, content}]}`; the reply
//! is `choices[0].message.content`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use pdfchat_core::completion::CompletionClient;
use pdfchat_core::error::{RagError, Stage};
use pdfchat_core::models::CompletionMessage;

use crate::config::CompletionConfig;
use crate::http;

pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
}

impl OpenAiChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for OpenAiChat {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, RagError> {
        let api_key = http::env_secret(Stage::Complete, &self.api_key_env)?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(Stage::Complete, e))?;
        let json = http::read_json(Stage::Complete, response).await?;
        let reply = parse_completion_response(&json)?;
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            reply_chars = reply.chars().count(),
            "completion received"
        );
        Ok(reply)
    }
}

/// Extract `choices[0].message.content`.
pub fn parse_completion_response(json: &Value) -> Result<String, RagError> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| RagError::semantic(Stage::Complete, "response has no choices array"))?;
    let first = choices
        .first()
        .ok_or_else(|| RagError::semantic(Stage::Complete, "response contained no choices"))?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::semantic(Stage::Complete, "choice has no message content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_first_choice() {
        let json = json!({"choices": [
            {"message": {"role": "assistant", "content": "first"}},
            {"message": {"role": "assistant", "content": "second"}}
        ]});
        assert_eq!(parse_completion_response(&json).unwrap(), "first");
    }

    #[test]
    fn test_empty_choices_is_semantic() {
        let err = parse_completion_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(
            err,
            RagError::BackendSemantic {
                stage: Stage::Complete,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_content_rejected() {
        let json = json!({"choices": [{"message": {"role": "assistant"}}]});
        assert!(parse_completion_response(&json).is_err());
    }
}
