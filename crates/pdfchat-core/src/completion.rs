//! Completion backend trait.

use async_trait::async_trait;

use crate::error::RagError;
use crate::models::CompletionMessage;

/// Sends a role-tagged message list to an LLM and returns the reply text.
///
/// Implementations must fail with [`RagError::BackendSemantic`] when the
/// backend returns no choices, and must not retry.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, RagError>;
}
