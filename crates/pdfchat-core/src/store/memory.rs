//! In-memory [`Indexer`], [`Retriever`] and [`HistoryStore`] implementations
//! for tests and local experiments.
//!
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over every stored record; here the store
//! *is* the backend, so it owns the ranking.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Stage};
use crate::models::{ChatMessage, IndexRecord, NewChatMessage, ScoredChunk};

use super::{HistoryStore, Indexer, Retriever, SearchParams, SessionLookup};

fn poisoned(stage: Stage) -> RagError {
    RagError::persistence(stage, "in-memory store lock poisoned")
}

/// In-memory vector index keyed by content hash.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<HashMap<String, IndexRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl Indexer for InMemoryIndex {
    async fn upsert(&self, record: &IndexRecord) -> Result<(), RagError> {
        let mut records = self.records.write().map_err(|_| poisoned(Stage::Index))?;
        let mut record = record.clone();
        if let Some(existing) = records.get(record.id()) {
            record.created_at = existing.created_at;
        }
        records.insert(record.id().to_string(), record);
        Ok(())
    }
}

#[async_trait]
impl Retriever for InMemoryIndex {
    async fn search(
        &self,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let records = self.records.read().map_err(|_| poisoned(Stage::Search))?;
        let mut hits: Vec<ScoredChunk> = records
            .values()
            .map(|r| ScoredChunk {
                source_ref: r.chunk.source_ref.clone(),
                offset: r.chunk.offset,
                content: r.chunk.content.clone(),
                score: cosine_similarity(query, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_ref.cmp(&b.source_ref))
                .then_with(|| a.offset.cmp(&b.offset))
        });
        hits.truncate(params.k.min(params.num_candidates));
        Ok(hits)
    }
}

/// In-memory append-only chat history.
#[derive(Default)]
pub struct InMemoryHistory {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn lookup(&self, chat_id: i64) -> Result<SessionLookup, RagError> {
        let messages = self.messages.read().map_err(|_| poisoned(Stage::History))?;
        let session: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        Ok(SessionLookup::from_messages(session))
    }

    async fn append(&self, message: &NewChatMessage) -> Result<ChatMessage, RagError> {
        let mut messages = self.messages.write().map_err(|_| poisoned(Stage::History))?;
        let stored = ChatMessage {
            id: messages.len() as i64 + 1,
            chat_id: message.chat_id,
            text: message.text.clone(),
            is_bot: message.is_bot,
            rendered_prompt: message.rendered_prompt.clone(),
            language: message.language.clone(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn chat_ids(&self) -> Result<Vec<i64>, RagError> {
        let messages = self.messages.read().map_err(|_| poisoned(Stage::History))?;
        let mut ids: Vec<i64> = messages.iter().map(|m| m.chat_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
