use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

use super::types::{ErrorClass, StreamChunk};
use crate::core::turn::WireMessage;

/// Errors that can occur during provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider misconfigured (missing API key, bad URL).
    #[error("config error: {0}")]
    Config(String),
    /// Network-level failure (timeout, DNS, connection refused).
    #[error("network error: {0}")]
    Network(String),
    /// API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    /// The provider reported an error inside an otherwise healthy stream.
    #[error("stream error: {0}")]
    Stream(String),
    /// Failed to build or parse a provider payload.
    #[error("parse error: {0}")]
    Parse(String),
    /// The receiving side of the chunk channel went away.
    #[error("channel closed")]
    ChannelClosed,
}

impl ProviderError {
    /// Buckets the error for the client-facing response.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Config(_) => ErrorClass::Configuration,
            ProviderError::Api { status: 401 | 403, .. } => ErrorClass::Configuration,
            ProviderError::Api { status: 429, .. } => ErrorClass::RateLimited,
            _ => ErrorClass::Other,
        }
    }
}

/// Everything a provider needs to fulfill a completion request.
pub struct CompletionRequest<'a> {
    pub messages: &'a [WireMessage],
    pub system: &'a str,
    pub model: &'a str,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the name of the provider.
    fn name(&self) -> &str;

    /// Streams a completion, sending chunks to `sender` in arrival order.
    /// Returns once the provider signals the end of the reply.
    async fn stream_completion(
        &self,
        request: CompletionRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError>;
}
