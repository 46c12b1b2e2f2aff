//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::mpsc::Sender;

use crate::client::{ByteStream, ChatTransport, TransportError};
use crate::core::turn::WireMessage;
use crate::inference::{CompletionProvider, CompletionRequest, ProviderError, StreamChunk};

// ============================================================================
// Transport
// ============================================================================

/// Replays a fixed response body for every request and records what was sent.
pub struct ScriptedTransport {
    response: Result<Vec<Result<Bytes, TransportError>>, TransportError>,
    requests: Mutex<Vec<Vec<WireMessage>>>,
}

impl ScriptedTransport {
    pub fn chunks(chunks: Vec<Result<Bytes, TransportError>>) -> Self {
        Self {
            response: Ok(chunks),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Delivers `body` in chunks of `size` bytes, ignoring character boundaries.
    pub fn split(body: &[u8], size: usize) -> Self {
        Self::chunks(
            body.chunks(size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect(),
        )
    }

    pub fn rejecting(error: TransportError) -> Self {
        Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<WireMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, history: &[WireMessage]) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(history.to_vec());
        let chunks = self.response.clone()?;
        Ok(Box::pin(stream::iter(chunks)))
    }
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Clone, Copy)]
pub enum Ending {
    Finish,
    Fail(fn() -> ProviderError),
    /// Never returns, like a provider that stalls mid-reply.
    Hang,
}

/// Sends a fixed list of chunks, then ends the way it was told to.
pub struct ScriptedProvider {
    chunks: Vec<StreamChunk>,
    ending: Ending,
    requests: Mutex<Vec<(String, String, Vec<WireMessage>)>>,
}

impl ScriptedProvider {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            chunks: fragments
                .iter()
                .map(|f| StreamChunk::Text(f.to_string()))
                .chain(std::iter::once(StreamChunk::Stop("stop".into())))
                .collect(),
            ending: Ending::Finish,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Finishes cleanly without sending a single chunk.
    pub fn silent() -> Self {
        Self {
            chunks: Vec::new(),
            ending: Ending::Finish,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: fn() -> ProviderError) -> Self {
        Self::replying(&[]).ending(Ending::Fail(error))
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        if !matches!(ending, Ending::Finish) {
            self.chunks.retain(|c| matches!(c, StreamChunk::Text(_)));
        }
        self.ending = ending;
        self
    }

    /// `(model, system, messages)` for every request received.
    pub fn requests(&self) -> Vec<(String, String, Vec<WireMessage>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        self.requests.lock().unwrap().push((
            request.model.to_string(),
            request.system.to_string(),
            request.messages.to_vec(),
        ));

        for chunk in &self.chunks {
            sender
                .send(chunk.clone())
                .await
                .map_err(|_| ProviderError::ChannelClosed)?;
        }

        match self.ending {
            Ending::Finish => Ok(()),
            Ending::Fail(error) => Err(error()),
            Ending::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Serves `router` on an ephemeral port and returns its base URL.
pub async fn spawn_app(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
