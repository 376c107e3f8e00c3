//! Storage abstractions for the vector index and the chat history.
//!
//! The pipeline only talks to these traits. Backends are owned values
//! handed to components at construction; there is no ambient global
//! handle.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Indexer`] | Upsert one [`IndexRecord`] keyed by its content hash |
//! | [`Retriever`] | Approximate nearest-neighbour search over stored vectors |
//! | [`HistoryStore`] | Append-only chat messages grouped by chat id |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::RagError;
use crate::models::{ChatMessage, IndexRecord, NewChatMessage, ScoredChunk};

/// Default number of results and candidate pool size.
pub const DEFAULT_SEARCH_K: usize = 10;

/// Nearest-neighbour tuning, passed through to the backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Maximum number of hits returned.
    pub k: usize,
    /// Candidate pool the backend searches approximately.
    pub num_candidates: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_SEARCH_K,
            num_candidates: DEFAULT_SEARCH_K,
        }
    }
}

/// Writes index records.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Insert the record, replacing any record with the same identifier.
    async fn upsert(&self, record: &IndexRecord) -> Result<(), RagError>;
}

/// Nearest-neighbour search over indexed chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `params.k` hits in the backend's own descending-score order.
    /// An empty result is not an error.
    async fn search(
        &self,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, RagError>;
}

/// Result of looking up a chat session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    /// No message has been stored for this chat id yet.
    NotFound,
    /// Prior messages in insertion order; never empty.
    Found(Vec<ChatMessage>),
}

impl SessionLookup {
    /// Build from a row set, mapping zero rows to [`SessionLookup::NotFound`].
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        if messages.is_empty() {
            SessionLookup::NotFound
        } else {
            SessionLookup::Found(messages)
        }
    }
}

/// Append-only chat history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn lookup(&self, chat_id: i64) -> Result<SessionLookup, RagError>;

    /// Append a message and return it with its assigned id.
    async fn append(&self, message: &NewChatMessage) -> Result<ChatMessage, RagError>;

    /// All chat ids that have at least one message, ascending.
    async fn chat_ids(&self) -> Result<Vec<i64>, RagError>;
}
