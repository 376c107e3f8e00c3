//! Chat service: wires the configured backends into a [`ChatEngine`] and
//! serializes turns per session.
//!
//! Two requests for the same `chat_id` never run concurrently, so two
//! simultaneous first messages cannot both start a NEW session. Different
//! sessions proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use pdfchat_core::conversation::{ChatBackends, ChatEngine, ChatTurn, TurnOutcome};
use pdfchat_core::error::RagError;
use pdfchat_core::models::ChatMessage;
use pdfchat_core::prompt::TemplateRenderer;
use pdfchat_core::store::{HistoryStore, SessionLookup};

use crate::completion::OpenAiChat;
use crate::config::Config;
use crate::db;
use crate::elastic::ElasticIndex;
use crate::embedding::create_embedder;
use crate::history::SqliteHistory;
use crate::migrate;

type SessionLock = Arc<tokio::sync::Mutex<()>>;

pub struct ChatService {
    engine: ChatEngine,
    sessions: Mutex<HashMap<i64, SessionLock>>,
}

impl ChatService {
    pub fn new(engine: ChatEngine) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open the history database and build every backend from `config`.
    ///
    /// Templates are parsed here, so a malformed template fails startup.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let renderer =
            TemplateRenderer::new(&config.prompts.init_question, &config.prompts.continuation)
                .context("Invalid [prompts] template")?;
        let index = Arc::new(ElasticIndex::new(&config.index)?);
        let completion = OpenAiChat::new(&config.completion)?;
        if !config.embedding.is_enabled() {
            tracing::warn!("embedding provider is disabled; new chats will fail to ground");
        }
        tracing::info!(
            embedding = %config.embedding.provider,
            completion_model = completion.model(),
            "chat backends ready"
        );

        let backends = ChatBackends {
            embedder: create_embedder(&config.embedding)?,
            retriever: index,
            renderer: Arc::new(renderer),
            completion: Arc::new(completion),
            history: Arc::new(SqliteHistory::new(pool)),
        };
        let engine = ChatEngine::new(backends)
            .with_search_params(config.retrieval.search_params())
            .with_default_language(config.prompts.default_language.clone());

        Ok(Self::new(engine))
    }

    fn session_lock(&self, chat_id: i64) -> SessionLock {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        // Forget locks nobody is holding or waiting on.
        sessions.retain(|_, lock| Arc::strong_count(lock) > 1);
        sessions.entry(chat_id).or_default().clone()
    }

    /// Run one chat turn for `chat_id`.
    pub async fn send(
        &self,
        chat_id: i64,
        message: &str,
        language: Option<String>,
    ) -> Result<TurnOutcome, RagError> {
        let lock = self.session_lock(chat_id);
        let _guard = lock.lock().await;

        let turn = ChatTurn {
            chat_id,
            question: message.to_string(),
            language,
        };
        match self.engine.respond(&turn).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if e.is_backend_failure() {
                    tracing::warn!(chat_id, stage = %e.stage(), error = %e, "backend failed during chat turn");
                } else {
                    tracing::error!(chat_id, stage = %e.stage(), error = %e, "chat turn failed");
                }
                Err(e)
            }
        }
    }

    pub async fn chat_ids(&self) -> Result<Vec<i64>, RagError> {
        self.engine.history().chat_ids().await
    }

    /// Messages of a session in insertion order; empty for unknown chats.
    pub async fn messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>, RagError> {
        match self.engine.history().lookup(chat_id).await? {
            SessionLookup::NotFound => Ok(Vec::new()),
            SessionLookup::Found(messages) => Ok(messages),
        }
    }
}

pub async fn run_ask(
    config: &Config,
    chat_id: i64,
    message: &str,
    language: Option<String>,
) -> Result<()> {
    let service = ChatService::from_config(config).await?;
    let outcome = service.send(chat_id, message, language).await?;

    println!("chat {} ({})", chat_id, outcome.state.as_str());
    if outcome.rendered_prompt.is_some() {
        println!("  grounding documents: {}", outcome.grounding_documents);
    }
    println!();
    println!("{}", outcome.reply);
    Ok(())
}

pub async fn run_history(config: &Config, chat_id: Option<i64>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let history = SqliteHistory::new(pool);

    match chat_id {
        None => {
            let ids = history.chat_ids().await?;
            if ids.is_empty() {
                println!("No chats.");
            }
            for id in ids {
                println!("{}", id);
            }
        }
        Some(chat_id) => {
            let messages = history.messages(chat_id).await?;
            if messages.is_empty() {
                println!("No messages for chat {}.", chat_id);
            }
            for m in messages {
                let speaker = if m.is_bot { "bot" } else { "user" };
                println!("[{}] {}: {}", m.id, speaker, m.text);
            }
        }
    }

    history.pool().close().await;
    Ok(())
}
