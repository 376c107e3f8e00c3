//! SQLite-backed chat history.
//!
//! Rows in `chat_history` are only ever inserted. A session is the set of
//! rows sharing a `chat_id`, ordered by the autoincrement `id`.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use pdfchat_core::error::{RagError, Stage};
use pdfchat_core::models::{ChatMessage, NewChatMessage};
use pdfchat_core::store::{HistoryStore, SessionLookup};

/// [`HistoryStore`] over an owned SQLite pool.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All messages of a session in insertion order; empty if unknown.
    pub async fn messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>, RagError> {
        let rows = sqlx::query(
            "SELECT id, chat_id, message, is_bot, real_message, language \
             FROM chat_history WHERE chat_id = ? ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_message).collect())
    }
}

fn db_error(e: sqlx::Error) -> RagError {
    RagError::persistence(Stage::History, e.to_string())
}

fn row_to_message(row: &SqliteRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        text: row.get("message"),
        is_bot: row.get("is_bot"),
        rendered_prompt: row.get("real_message"),
        language: row.get("language"),
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn lookup(&self, chat_id: i64) -> Result<SessionLookup, RagError> {
        Ok(SessionLookup::from_messages(self.messages(chat_id).await?))
    }

    async fn append(&self, message: &NewChatMessage) -> Result<ChatMessage, RagError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO chat_history (chat_id, message, is_bot, real_message, language, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.chat_id)
        .bind(&message.text)
        .bind(message.is_bot)
        .bind(&message.rendered_prompt)
        .bind(&message.language)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            chat_id: message.chat_id,
            text: message.text.clone(),
            is_bot: message.is_bot,
            rendered_prompt: message.rendered_prompt.clone(),
            language: message.language.clone(),
        })
    }

    async fn chat_ids(&self) -> Result<Vec<i64>, RagError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT chat_id FROM chat_history ORDER BY chat_id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(ids)
    }
}
