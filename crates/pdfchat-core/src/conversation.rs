//! Conversation threading: the NEW vs CONTINUING decision and the turn
//! pipeline for each state.
//!
//! A session is the set of stored messages sharing a `chat_id`. The first
//! user message of a session is grounded: it is embedded, the nearest
//! chunks are retrieved, and the initial-question template renders them
//! together with the question into one prompt. Every later turn replays
//! the stored history as role-tagged messages and appends the new question
//! rendered with the continuation template; retrieval is never repeated.
//!
//! ```text
//! lookup(chat_id)
//!   ├─ NotFound → embed → search → render_initial → complete([user])
//!   │             → append(user, rendered_prompt) → append(bot)
//!   └─ Found(h) → map(h) + render_continuation → complete(messages)
//!                 → append(user) → append(bot)
//! ```
//!
//! Messages are persisted only after the completion succeeds. If the bot
//! reply write fails after the user message was stored, the session is left
//! with a dangling user message; the next turn treats it as CONTINUING.
//!
//! Turns on the same `chat_id` must be serialized by the caller.

use std::sync::Arc;

use serde::Serialize;

use crate::completion::CompletionClient;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::models::{ChatMessage, CompletionMessage, GroundingDocument, NewChatMessage};
use crate::prompt::{Continuation, InitialQuestion, PromptRenderer};
use crate::store::{HistoryStore, Retriever, SearchParams, SessionLookup};

/// Language used when a turn does not name one.
pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    New,
    Continuing,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::New => "new",
            ConversationState::Continuing => "continuing",
        }
    }
}

/// One incoming user message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub chat_id: i64,
    pub question: String,
    pub language: Option<String>,
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub state: ConversationState,
    pub reply: String,
    /// The grounded prompt sent on a NEW turn.
    pub rendered_prompt: Option<String>,
    /// Number of grounding documents retrieved (0 on CONTINUING turns).
    pub grounding_documents: usize,
}

/// The remote and storage backends a [`ChatEngine`] drives.
#[derive(Clone)]
pub struct ChatBackends {
    pub embedder: Arc<dyn Embedder>,
    pub retriever: Arc<dyn Retriever>,
    pub renderer: Arc<dyn PromptRenderer>,
    pub completion: Arc<dyn CompletionClient>,
    pub history: Arc<dyn HistoryStore>,
}

/// Runs chat turns against a set of backends.
#[derive(Clone)]
pub struct ChatEngine {
    backends: ChatBackends,
    search: SearchParams,
    default_language: String,
}

impl ChatEngine {
    pub fn new(backends: ChatBackends) -> Self {
        Self {
            backends,
            search: SearchParams::default(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_search_params(mut self, search: SearchParams) -> Self {
        self.search = search;
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.backends.history
    }

    /// Run one turn: decide the state from stored history, call the
    /// backends for that state, and persist the exchange.
    pub async fn respond(&self, turn: &ChatTurn) -> Result<TurnOutcome, RagError> {
        let language = resolve_language(turn.language.as_deref(), &self.default_language);

        match self.backends.history.lookup(turn.chat_id).await? {
            SessionLookup::NotFound => {
                tracing::info!(chat_id = turn.chat_id, state = "new", "starting session");
                self.respond_new(turn, language).await
            }
            SessionLookup::Found(history) => {
                tracing::info!(
                    chat_id = turn.chat_id,
                    state = "continuing",
                    prior_messages = history.len(),
                    "continuing session"
                );
                self.respond_continuing(turn, language, &history).await
            }
        }
    }

    async fn respond_new(&self, turn: &ChatTurn, language: &str) -> Result<TurnOutcome, RagError> {
        let query = self.backends.embedder.embed(&turn.question).await?;
        let hits = self.backends.retriever.search(&query, &self.search).await?;
        let documents: Vec<GroundingDocument> = hits.into_iter().map(Into::into).collect();
        tracing::debug!(
            chat_id = turn.chat_id,
            documents = documents.len(),
            "retrieved grounding documents"
        );

        let rendered = self.backends.renderer.render_initial(&InitialQuestion {
            language,
            question: &turn.question,
            documents: &documents,
        })?;

        let reply = self
            .backends
            .completion
            .complete(&[CompletionMessage::user(rendered.clone())])
            .await?;

        self.backends
            .history
            .append(&NewChatMessage::user(
                turn.chat_id,
                turn.question.clone(),
                Some(rendered.clone()),
                Some(language.to_string()),
            ))
            .await?;
        self.backends
            .history
            .append(&NewChatMessage::bot(turn.chat_id, reply.clone()))
            .await?;

        Ok(TurnOutcome {
            state: ConversationState::New,
            reply,
            rendered_prompt: Some(rendered),
            grounding_documents: documents.len(),
        })
    }

    async fn respond_continuing(
        &self,
        turn: &ChatTurn,
        language: &str,
        history: &[ChatMessage],
    ) -> Result<TurnOutcome, RagError> {
        let mut messages = history_to_messages(history);
        let rendered = self.backends.renderer.render_continuation(&Continuation {
            question: &turn.question,
            language,
        })?;
        messages.push(CompletionMessage::user(rendered));

        let reply = self.backends.completion.complete(&messages).await?;

        self.backends
            .history
            .append(&NewChatMessage::user(
                turn.chat_id,
                turn.question.clone(),
                None,
                Some(language.to_string()),
            ))
            .await?;
        self.backends
            .history
            .append(&NewChatMessage::bot(turn.chat_id, reply.clone()))
            .await?;

        Ok(TurnOutcome {
            state: ConversationState::Continuing,
            reply,
            rendered_prompt: None,
            grounding_documents: 0,
        })
    }
}

/// Map stored history to completion messages in insertion order.
///
/// Bot messages become `assistant`; user messages become `user`, carrying
/// the rendered grounding prompt instead of the raw text when one was
/// stored, so the model sees the same context it saw on the first turn.
pub fn history_to_messages(history: &[ChatMessage]) -> Vec<CompletionMessage> {
    history
        .iter()
        .map(|m| {
            if m.is_bot {
                CompletionMessage::assistant(m.text.clone())
            } else {
                let content = match m.rendered_prompt.as_deref() {
                    Some(prompt) if !prompt.is_empty() => prompt,
                    _ => m.text.as_str(),
                };
                CompletionMessage::user(content)
            }
        })
        .collect()
}

/// The turn's language, or `default` when absent or blank.
pub fn resolve_language<'a>(language: Option<&'a str>, default: &'a str) -> &'a str {
    match language.map(str::trim) {
        Some(l) if !l.is_empty() => l,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::models::{Role, ScoredChunk};
    use crate::prompt::TemplateRenderer;
    use crate::store::memory::InMemoryHistory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f64>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    struct FixedRetriever {
        hits: Vec<ScoredChunk>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _query: &[f64],
            params: &SearchParams,
        ) -> Result<Vec<ScoredChunk>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(params.k).cloned().collect())
        }
    }

    struct RecordingCompletion {
        requests: Mutex<Vec<Vec<CompletionMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletion {
        async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, RagError> {
            if self.fail {
                return Err(RagError::semantic(Stage::Complete, "no choices"));
            }
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            Ok(format!("reply {}", requests.len()))
        }
    }

    struct Harness {
        engine: ChatEngine,
        embedder: Arc<FixedEmbedder>,
        retriever: Arc<FixedRetriever>,
        completion: Arc<RecordingCompletion>,
        history: Arc<InMemoryHistory>,
    }

    fn harness(hits: Vec<ScoredChunk>, fail_completion: bool) -> Harness {
        let embedder = Arc::new(FixedEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Arc::new(FixedRetriever {
            hits,
            calls: AtomicUsize::new(0),
        });
        let completion = Arc::new(RecordingCompletion {
            requests: Mutex::new(Vec::new()),
            fail: fail_completion,
        });
        let history = Arc::new(InMemoryHistory::new());
        let renderer = TemplateRenderer::new(
            "Docs:{{#documents}} [{{url}}] {{content}}{{/documents}}\nAnswer in {{language}}: {{question}}",
            "({{language}}) {{question}}",
        )
        .unwrap();
        let engine = ChatEngine::new(ChatBackends {
            embedder: embedder.clone(),
            retriever: retriever.clone(),
            renderer: Arc::new(renderer),
            completion: completion.clone(),
            history: history.clone(),
        });
        Harness {
            engine,
            embedder,
            retriever,
            completion,
            history,
        }
    }

    fn hit(source: &str, content: &str) -> ScoredChunk {
        ScoredChunk {
            source_ref: source.to_string(),
            offset: 0,
            content: content.to_string(),
            score: 0.9,
        }
    }

    fn turn(chat_id: i64, question: &str) -> ChatTurn {
        ChatTurn {
            chat_id,
            question: question.to_string(),
            language: None,
        }
    }

    #[tokio::test]
    async fn test_new_session_prompt_is_what_completion_receives() {
        let h = harness(vec![hit("manual.pdf", "X is a sealant.")], false);
        let outcome = h.engine.respond(&turn(1, "What is X?")).await.unwrap();

        assert_eq!(outcome.state, ConversationState::New);
        assert_eq!(outcome.grounding_documents, 1);
        let rendered = outcome.rendered_prompt.clone().unwrap();
        assert_ne!(rendered, "What is X?");
        assert!(rendered.contains("X is a sealant."));

        let requests = h.completion.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], vec![CompletionMessage::user(rendered.clone())]);

        match h.history.lookup(1).await.unwrap() {
            SessionLookup::Found(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].text, "What is X?");
                assert_eq!(messages[0].rendered_prompt.as_deref(), Some(rendered.as_str()));
                assert_eq!(messages[0].language.as_deref(), Some("English"));
                assert!(messages[1].is_bot);
                assert_eq!(messages[1].text, "reply 1");
            }
            SessionLookup::NotFound => panic!("session should be stored"),
        }
    }

    #[tokio::test]
    async fn test_continuing_never_retrieves_and_grounds_once() {
        let h = harness(vec![hit("manual.pdf", "X is a sealant.")], false);
        h.engine.respond(&turn(1, "What is X?")).await.unwrap();
        let second = h.engine.respond(&turn(1, "And Y?")).await.unwrap();
        let third = h.engine.respond(&turn(1, "And Z?")).await.unwrap();

        assert_eq!(second.state, ConversationState::Continuing);
        assert_eq!(third.state, ConversationState::Continuing);
        assert!(second.rendered_prompt.is_none());
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 1);

        if let SessionLookup::Found(messages) = h.history.lookup(1).await.unwrap() {
            let grounded = messages
                .iter()
                .filter(|m| m.rendered_prompt.is_some())
                .count();
            assert_eq!(grounded, 1);
            assert_eq!(messages.len(), 6);
        } else {
            panic!("session should be stored");
        }
    }

    #[tokio::test]
    async fn test_continuing_message_list_replays_history() {
        let h = harness(vec![hit("manual.pdf", "X is a sealant.")], false);
        let first = h.engine.respond(&turn(1, "What is X?")).await.unwrap();
        h.engine.respond(&turn(1, "And Y?")).await.unwrap();

        let requests = h.completion.requests.lock().unwrap();
        let sent = &requests[1];
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], CompletionMessage::user(first.rendered_prompt.unwrap()));
        assert_eq!(sent[1], CompletionMessage::assistant("reply 1"));
        assert_eq!(sent[2], CompletionMessage::user("(English) And Y?"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_answers() {
        let h = harness(Vec::new(), false);
        let outcome = h.engine.respond(&turn(9, "Anything?")).await.unwrap();
        assert_eq!(outcome.state, ConversationState::New);
        assert_eq!(outcome.grounding_documents, 0);
        assert_eq!(
            outcome.rendered_prompt.as_deref(),
            Some("Docs:\nAnswer in English: Anything?")
        );
    }

    #[tokio::test]
    async fn test_failed_completion_persists_nothing() {
        let h = harness(vec![hit("manual.pdf", "text")], true);
        let err = h.engine.respond(&turn(5, "What is X?")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Complete);
        assert_eq!(h.history.lookup(5).await.unwrap(), SessionLookup::NotFound);
    }

    /// Fails the second append, leaving the first one stored.
    struct FailSecondAppend {
        inner: InMemoryHistory,
        appends: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for FailSecondAppend {
        async fn lookup(&self, chat_id: i64) -> Result<SessionLookup, RagError> {
            self.inner.lookup(chat_id).await
        }

        async fn append(&self, message: &NewChatMessage) -> Result<ChatMessage, RagError> {
            if self.appends.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(RagError::persistence(Stage::History, "disk full"));
            }
            self.inner.append(message).await
        }

        async fn chat_ids(&self) -> Result<Vec<i64>, RagError> {
            self.inner.chat_ids().await
        }
    }

    #[tokio::test]
    async fn test_failed_reply_write_leaves_user_message_behind() {
        let h = harness(vec![hit("manual.pdf", "X is a sealant.")], false);
        let history = Arc::new(FailSecondAppend {
            inner: InMemoryHistory::new(),
            appends: AtomicUsize::new(0),
        });
        let engine = ChatEngine::new(ChatBackends {
            embedder: h.embedder.clone(),
            retriever: h.retriever.clone(),
            renderer: Arc::new(
                TemplateRenderer::new(
                    "{{#documents}}{{content}} {{/documents}}{{question}}",
                    "{{question}}",
                )
                .unwrap(),
            ),
            completion: h.completion.clone(),
            history: history.clone(),
        });

        let err = engine.respond(&turn(4, "What is X?")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::History);

        // The dangling user message makes the session CONTINUING
        let next = engine.respond(&turn(4, "And Y?")).await.unwrap();
        assert_eq!(next.state, ConversationState::Continuing);
        assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 1);

        let requests = h.completion.requests.lock().unwrap();
        assert_eq!(
            requests[1],
            vec![
                CompletionMessage::user("X is a sealant. What is X?"),
                CompletionMessage::user("And Y?"),
            ]
        );
        drop(requests);

        match history.lookup(4).await.unwrap() {
            SessionLookup::Found(messages) => {
                let bots = messages.iter().filter(|m| m.is_bot).count();
                assert_eq!(messages.len(), 3);
                assert_eq!(bots, 1);
            }
            SessionLookup::NotFound => panic!("user message should be stored"),
        }
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let h = harness(vec![hit("manual.pdf", "text")], false);
        h.engine.respond(&turn(1, "first")).await.unwrap();
        let other = h.engine.respond(&turn(2, "second")).await.unwrap();
        assert_eq!(other.state, ConversationState::New);
        assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_turn_language_overrides_default() {
        let h = harness(Vec::new(), false);
        let outcome = h
            .engine
            .respond(&ChatTurn {
                chat_id: 3,
                question: "Was ist X?".to_string(),
                language: Some("German".to_string()),
            })
            .await
            .unwrap();
        assert!(outcome.rendered_prompt.unwrap().contains("Answer in German"));
    }

    #[test]
    fn test_role_mapping() {
        let stored = vec![
            ChatMessage {
                id: 1,
                chat_id: 1,
                text: "A".to_string(),
                is_bot: false,
                rendered_prompt: None,
                language: None,
            },
            ChatMessage {
                id: 2,
                chat_id: 1,
                text: "B".to_string(),
                is_bot: true,
                rendered_prompt: None,
                language: None,
            },
        ];
        let messages = history_to_messages(&stored);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
        assert_eq!(messages[0].content, "A");
        assert_eq!(messages[1].content, "B");
    }

    #[test]
    fn test_rendered_prompt_substitutes_user_text() {
        let stored = vec![ChatMessage {
            id: 1,
            chat_id: 1,
            text: "raw".to_string(),
            is_bot: false,
            rendered_prompt: Some("grounded".to_string()),
            language: None,
        }];
        assert_eq!(
            history_to_messages(&stored),
            vec![CompletionMessage::user("grounded")]
        );
    }

    #[test]
    fn test_resolve_language() {
        assert_eq!(resolve_language(Some("French"), "English"), "French");
        assert_eq!(resolve_language(Some("  "), "English"), "English");
        assert_eq!(resolve_language(None, "English"), "English");
    }
}
