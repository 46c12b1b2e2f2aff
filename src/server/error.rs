//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`IntoResponse`] so errors become a JSON `{"error": ...}` response with
//! the right status code.
//!
//! Provider and storage failures are logged in full, but the client only
//! ever sees a fixed message. Upstream error text never leaves the server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

use crate::core::history::HistoryError;
use crate::inference::{ErrorClass, ProviderError};

pub const CONFIG_ERROR_MESSAGE: &str = "AI service configuration error";
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const GENERIC_ERROR_MESSAGE: &str = "Failed to process chat request";

#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The completion provider failed before the reply started.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("history error: {0}")]
    History(HistoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<HistoryError> for ServerError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::NotFound(id) => ServerError::NotFound(format!("conversation {id}")),
            other => ServerError::History(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, format!("not found: {m}")),
            ServerError::Provider(e) => match e.class() {
                ErrorClass::Configuration => {
                    error!("Provider configuration error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, CONFIG_ERROR_MESSAGE.to_owned())
                }
                ErrorClass::RateLimited => {
                    warn!("Provider rate limited: {}", e);
                    (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE.to_owned())
                }
                ErrorClass::Other => {
                    error!("Provider error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE.to_owned())
                }
            },
            ServerError::History(e) => {
                error!("History store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Internal(m) => {
                error!("Internal server error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
