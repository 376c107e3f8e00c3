//! Chat HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/chat` | List chat ids |
//! | `GET`  | `/chat/{chat_id}` | Messages of one chat, ordered by id |
//! | `POST` | `/chat/{chat_id}` | Send a message, returns the bot reply |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "backend_error", "stage": "embed", "message": "embed transport failure: HTTP 503" } }
//! ```
//!
//! Error codes: `bad_request` (400), `backend_error` and
//! `backend_invalid_response` (502), `template_error`,
//! `persistence_error` and `internal` (500). `stage` names the pipeline
//! step that failed and is omitted for request validation errors.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! chat clients.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use pdfchat_core::conversation::ConversationState;
use pdfchat_core::error::{RagError, Stage};
use pdfchat_core::models::ChatMessage;

use crate::chat::ChatService;
use crate::config::Config;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    chat: Arc<ChatService>,
}

/// Starts the chat server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(ChatService::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    println!("pdfchat server listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, "server started");

    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// Build the router over an existing chat service.
pub fn router(chat: Arc<ChatService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", get(handle_list_chats))
        .route(
            "/chat/{chat_id}",
            get(handle_get_chat).post(handle_post_message),
        )
        .layer(cors)
        .with_state(AppState { chat })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"backend_error"`).
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    stage: Option<Stage>,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                stage: self.stage,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        stage: None,
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::Transport { .. } => (StatusCode::BAD_GATEWAY, "backend_error"),
            RagError::BackendSemantic { .. } => {
                (StatusCode::BAD_GATEWAY, "backend_invalid_response")
            }
            RagError::Template(_) => (StatusCode::INTERNAL_SERVER_ERROR, "template_error"),
            RagError::Persistence { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error")
            }
            RagError::Extract { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            stage: Some(err.stage()),
            message: err.to_string(),
        }
    }
}

fn parse_chat_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| bad_request(format!("chat_id must be an integer, got '{}'", raw)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /chat ============

#[derive(Serialize)]
struct ChatListResponse {
    status: String,
    chat_ids: Vec<i64>,
}

async fn handle_list_chats(State(state): State<AppState>) -> Result<Json<ChatListResponse>, AppError> {
    let chat_ids = state.chat.chat_ids().await?;
    Ok(Json(ChatListResponse {
        status: "success".to_string(),
        chat_ids,
    }))
}

// ============ GET /chat/{chat_id} ============

async fn handle_get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let chat_id = parse_chat_id(&chat_id)?;
    Ok(Json(state.chat.messages(chat_id).await?))
}

// ============ POST /chat/{chat_id} ============

#[derive(Deserialize)]
struct SendRequest {
    message: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Serialize)]
struct SendResponse {
    status: String,
    response: String,
    state: ConversationState,
}

/// Runs one chat turn. Returns `400` for a malformed body, an empty
/// message or a non-integer chat id, `502` when a backend fails, and `500` for
/// template or history failures.
async fn handle_post_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, AppError> {
    let chat_id = parse_chat_id(&chat_id)?;
    let Json(request) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let outcome = state
        .chat
        .send(chat_id, &request.message, request.language)
        .await?;

    Ok(Json(SendResponse {
        status: "message added".to_string(),
        response: outcome.reply,
        state: outcome.state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_bad_gateway() {
        let err = AppError::from(RagError::semantic(Stage::Complete, "no choices"));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "backend_invalid_response");
        assert_eq!(err.stage, Some(Stage::Complete));

        let err = AppError::from(RagError::transport(Stage::Search, "HTTP 503"));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_persistence_errors_map_to_internal() {
        let err = AppError::from(RagError::persistence(Stage::History, "disk full"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "persistence_error");
    }

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("42").ok(), Some(42));
        assert_eq!(parse_chat_id("abc").err().map(|e| e.status), Some(StatusCode::BAD_REQUEST));
    }
}
