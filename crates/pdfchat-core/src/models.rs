//! Core data models shared by ingestion and chat serving.
//!
//! Chunks flow from the chunker through the embedder into [`IndexRecord`]s;
//! chat turns are persisted as append-only [`ChatMessage`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed-size window of a document's text, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Origin reference (file path) of the document.
    pub source_ref: String,
    /// Position of this chunk within the document, starting at 0.
    pub sequence: usize,
    /// Character offset of the window start (`sequence * stride`).
    pub offset: usize,
    pub content: String,
    /// Record identifier derived from `source_ref` and `sequence`.
    pub content_hash: String,
}

/// Persisted projection of a [`Chunk`] plus its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub vector: Vec<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Pair a chunk with its vector, stamping both timestamps with `now`.
    pub fn new(chunk: Chunk, vector: Vec<f64>, now: DateTime<Utc>) -> Self {
        Self {
            chunk,
            vector,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.chunk.content_hash
    }
}

/// A retrieval hit in backend ranking order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub source_ref: String,
    pub offset: usize,
    pub content: String,
    pub score: f64,
}

/// A document handed to the initial-question template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundingDocument {
    pub url: String,
    pub offset: usize,
    pub content: String,
}

impl From<ScoredChunk> for GroundingDocument {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            url: hit.source_ref,
            offset: hit.offset,
            content: hit.content,
        }
    }
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    #[serde(rename = "message")]
    pub text: String,
    pub is_bot: bool,
    /// The grounded prompt the model actually saw for the opening question.
    #[serde(rename = "real_message", skip_serializing_if = "Option::is_none")]
    pub rendered_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A chat message about to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub chat_id: i64,
    pub text: String,
    pub is_bot: bool,
    pub rendered_prompt: Option<String>,
    pub language: Option<String>,
}

impl NewChatMessage {
    pub fn user(
        chat_id: i64,
        text: impl Into<String>,
        rendered_prompt: Option<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            chat_id,
            text: text.into(),
            is_bot: false,
            rendered_prompt,
            language,
        }
    }

    pub fn bot(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            is_bot: true,
            rendered_prompt: None,
            language: None,
        }
    }
}

/// Speaker role on the completion wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

impl CompletionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
