//! The request proxy (`POST /api/chat`).
//!
//! Validates the history, forwards it to the completion provider with the
//! configured system instruction and model, and relays the reply as line
//! records:
//!
//! ```text
//! 0:{"type":"textDelta","textDelta":"Hel"}
//! 0:{"type":"textDelta","textDelta":"lo"}
//! d:{"type":"finish","finishReason":"stop"}
//! ```
//!
//! The status is decided by the provider's first move: a failure before any
//! text becomes a 4xx/5xx JSON error, anything later becomes an error record
//! inside the 200 stream. The whole exchange is capped at `max_duration`;
//! on expiry the provider task is aborted and the stream ends with an error
//! record.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use futures::Stream;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};

use crate::core::turn::WireMessage;
use crate::inference::{CompletionRequest, ProviderError, StreamChunk};
use crate::server::AppState;
use crate::server::error::{GENERIC_ERROR_MESSAGE, ServerError};
use crate::stream::Record;

pub const TIMEOUT_MESSAGE: &str = "The request timed out. Please try again.";
const CHANNEL_CAPACITY: usize = 64;

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    messages: Option<serde_json::Value>,
}

/// Checks the request body. Nothing reaches the provider unless this passes.
fn parse_messages(body: &[u8]) -> Result<Vec<WireMessage>, ServerError> {
    let body: ChatBody = serde_json::from_slice(body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;
    let value = body
        .messages
        .ok_or_else(|| ServerError::BadRequest("messages is required".into()))?;
    if !value.is_array() {
        return Err(ServerError::BadRequest("messages must be an array".into()));
    }
    let messages: Vec<WireMessage> = serde_json::from_value(value)
        .map_err(|e| ServerError::BadRequest(format!("invalid message: {e}")))?;
    if messages.is_empty() {
        return Err(ServerError::BadRequest("messages must not be empty".into()));
    }
    Ok(messages)
}

pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ServerError> {
    let messages = parse_messages(&body)?;
    let deadline = Instant::now() + state.max_duration;
    info!(
        "Chat request: {} messages via {} ({})",
        messages.len(),
        state.provider.name(),
        state.model
    );

    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let provider = Arc::clone(&state.provider);
    let model = state.model.clone();
    let system = state.system_prompt.clone();
    let mut task = tokio::spawn(async move {
        let request = CompletionRequest {
            messages: &messages,
            system: &system,
            model: &model,
        };
        provider.stream_completion(request, tx).await
    });

    // Hold the status line until the provider either produces something or fails.
    let (first, upstream) = match timeout_at(deadline, rx.recv()).await {
        Ok(Some(chunk)) => (Some(chunk), Upstream::Running(task)),
        Ok(None) => {
            let joined = timeout_at(deadline, &mut task).await;
            match joined {
                Ok(Ok(Ok(()))) => (None, Upstream::Finished),
                Ok(Ok(Err(e))) => return Err(ServerError::Provider(e)),
                Ok(Err(e)) => return Err(ServerError::Internal(format!("provider task failed: {e}"))),
                Err(_) => {
                    task.abort();
                    return Ok(stream_response(Relay::timed_out()));
                }
            }
        }
        Err(_) => {
            warn!("Provider produced nothing within {:?}", state.max_duration);
            task.abort();
            return Ok(stream_response(Relay::timed_out()));
        }
    };

    let relay = Relay {
        first,
        rx,
        upstream,
        deadline,
        fragments: 0,
        done: false,
    };
    Ok(stream_response(relay))
}

fn stream_response(relay: Relay) -> Response {
    let mut response = Response::new(Body::from_stream(relay.into_stream()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Where the provider task stands, as far as the relay knows.
enum Upstream {
    Running(JoinHandle<Result<(), ProviderError>>),
    /// Already joined with a clean finish; the handle must not be polled again.
    Finished,
    /// Aborted or never started.
    Gone,
}

/// Turns provider chunks into encoded records until the reply ends.
struct Relay {
    first: Option<StreamChunk>,
    rx: mpsc::Receiver<StreamChunk>,
    upstream: Upstream,
    deadline: Instant,
    fragments: usize,
    done: bool,
}

impl Relay {
    /// A relay that only reports the timeout.
    fn timed_out() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            first: None,
            rx,
            upstream: Upstream::Gone,
            deadline: Instant::now(),
            fragments: 0,
            done: false,
        }
    }

    fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures::stream::unfold(self, |mut relay| async move {
            relay.next_record().await.map(|line| (Ok(Bytes::from(line)), relay))
        })
    }

    async fn next_record(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        loop {
            let next = match self.first.take() {
                Some(chunk) => Ok(Some(chunk)),
                None => timeout_at(self.deadline, self.rx.recv()).await,
            };
            match next {
                Ok(Some(StreamChunk::Text(text))) => {
                    self.fragments += 1;
                    return Some(Record::text(text).encode());
                }
                Ok(Some(StreamChunk::Stop(reason))) => {
                    debug!("Provider stop reason: {}", reason);
                }
                Ok(None) => {
                    self.done = true;
                    return Some(self.finish().await);
                }
                Err(_) => {
                    self.done = true;
                    warn!("Chat request exceeded its time budget after {} fragments", self.fragments);
                    self.abort();
                    return Some(Record::error(TIMEOUT_MESSAGE).encode());
                }
            }
        }
    }

    /// The provider closed the channel: report how it ended.
    async fn finish(&mut self) -> String {
        let task = match &mut self.upstream {
            Upstream::Running(task) => task,
            Upstream::Finished => {
                info!("Chat reply relayed: {} fragments", self.fragments);
                return Record::finish().encode();
            }
            Upstream::Gone => return Record::error(TIMEOUT_MESSAGE).encode(),
        };
        let joined = timeout_at(self.deadline, task).await;
        let record = match joined {
            Ok(Ok(Ok(()))) => {
                info!("Chat reply relayed: {} fragments", self.fragments);
                Record::finish()
            }
            Ok(Ok(Err(e))) => {
                warn!("Provider failed mid-reply after {} fragments: {}", self.fragments, e);
                Record::error(GENERIC_ERROR_MESSAGE)
            }
            Ok(Err(e)) => {
                warn!("Provider task failed: {}", e);
                Record::error(GENERIC_ERROR_MESSAGE)
            }
            Err(_) => {
                self.abort();
                Record::error(TIMEOUT_MESSAGE)
            }
        };
        self.upstream = Upstream::Gone;
        record.encode()
    }

    fn abort(&mut self) {
        if let Upstream::Running(task) = std::mem::replace(&mut self.upstream, Upstream::Gone) {
            task.abort();
        }
    }
}

impl Drop for Relay {
    /// A client that hangs up stops the provider call.
    fn drop(&mut self) {
        self.abort();
    }
}
