//! Conversation history routes under `/api/conversations`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::debug;
use serde::Deserialize;

use crate::core::history::{
    Conversation, ConversationWithMessages, HistoryError, HistoryStore, StoredMessage,
};
use crate::core::turn::Role;
use crate::server::AppState;
use crate::server::error::ServerError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conversations", get(list_conversations).post(create_conversation))
        .route(
            "/api/conversations/{id}",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route("/api/conversations/{id}/messages", post(append_message))
}

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct AppendMessageRequest {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Runs a history call on the blocking pool; the store does file I/O under a lock.
async fn with_history<T, F>(state: Arc<AppState>, f: F) -> Result<T, ServerError>
where
    F: FnOnce(&HistoryStore) -> Result<T, HistoryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.history))
        .await
        .map_err(|e| ServerError::Internal(format!("history task failed: {e}")))?
        .map_err(ServerError::from)
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Conversation>>, ServerError> {
    Ok(Json(with_history(state, |h| h.list()).await?))
}

/// An absent or empty body creates an untitled conversation.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), ServerError> {
    let title = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let req: CreateConversationRequest = serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;
        req.title
    };
    let conversation = with_history(state, move |h| h.create(title.as_deref())).await?;
    debug!("Conversation {} created via API", conversation.id);
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationWithMessages>, ServerError> {
    Ok(Json(with_history(state, move |h| h.get(&id)).await?))
}

pub async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<Json<Conversation>, ServerError> {
    if req.title.trim().is_empty() {
        return Err(ServerError::BadRequest("title must not be empty".into()));
    }
    let conversation = with_history(state, move |h| h.rename(&id, &req.title)).await?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    with_history(state, move |h| h.delete(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<StoredMessage>), ServerError> {
    let message = with_history(state, move |h| {
        h.append_message(&id, req.role, &req.content, req.model.as_deref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
