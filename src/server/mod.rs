//! # Proxy Server
//!
//! Axum application behind `wayfarer serve`:
//!
//! - `POST /api/chat`: the streaming request proxy ([`chat`])
//! - `/api/conversations/...`: saved conversation history ([`conversations`])
//!
//! Every route shares one [`AppState`]. Unknown paths get a JSON 404.

pub mod chat;
pub mod conversations;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::post;
use log::{info, warn};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::core::config::ResolvedConfig;
use crate::core::history::{HistoryError, HistoryStore};
use crate::inference::CompletionProvider;
use error::ServerError;

/// Shared state injected into every handler.
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
    pub model: String,
    pub system_prompt: String,
    pub max_duration: Duration,
    pub history: HistoryStore,
}

impl AppState {
    pub fn from_config(
        config: &ResolvedConfig,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self, HistoryError> {
        Ok(Self {
            provider,
            model: config.model_name.clone(),
            system_prompt: config.system_prompt.clone(),
            max_duration: config.max_duration,
            history: HistoryStore::open(config.data_dir.join("conversations"))?,
        })
    }

    #[cfg(test)]
    pub fn for_tests(provider: Arc<dyn CompletionProvider>, data_dir: &std::path::Path) -> Self {
        Self {
            provider,
            model: "test-model".to_string(),
            system_prompt: "You are a travel assistant.".to_string(),
            max_duration: Duration::from_secs(5),
            history: HistoryStore::open(data_dir.join("conversations"))
                .expect("history store in temp dir"),
        }
    }
}

/// Builds the complete application router.
pub fn router(state: Arc<AppState>) -> Router {
    let chat_route = post(chat::chat).layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    ));

    Router::new()
        .route("/api/chat", chat_route)
        .merge(conversations::router())
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

async fn not_found() -> ServerError {
    ServerError::NotFound("route".into())
}

/// Binds `addr` and serves until Ctrl-C or SIGTERM.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let provider = state.provider.name().to_string();
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{} (provider: {})", listener.local_addr()?, provider);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
