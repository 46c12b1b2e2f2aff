//! # Chat Client
//!
//! The client side of `POST /api/chat`: a [`ChatTransport`] that delivers a
//! history and hands back the raw reply body, and the terminal front end
//! built on [`ChatSession`](crate::core::session::ChatSession).

pub mod repl;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::core::turn::WireMessage;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with something other than 200.
    #[error("server returned HTTP {0}")]
    Status(u16),
    /// Connection failed or dropped mid-body.
    #[error("network error: {0}")]
    Network(String),
}

/// Raw reply body, chunked however the network delivered it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends the full history. Resolves once the response status is known.
    async fn send(&self, history: &[WireMessage]) -> Result<ByteStream, TransportError>;
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    messages: &'a [WireMessage],
}

/// Talks to a running `wayfarer serve` over HTTP.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, history: &[WireMessage]) -> Result<ByteStream, TransportError> {
        info!("Sending {} messages to {}", history.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequestBody { messages: history })
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        debug!("Chat response status: {}", status);
        if status != reqwest::StatusCode::OK {
            warn!("Chat request rejected: HTTP {}", status.as_u16());
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Network(e.to_string())));
        Ok(Box::pin(body))
    }
}
