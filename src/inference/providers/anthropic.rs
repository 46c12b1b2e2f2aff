//! Anthropic provider using the Messages API.
//!
//! The system instruction is a top-level field, not a message. The stream is
//! a sequence of typed SSE events; only `content_block_delta` carries text.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::core::turn::WireMessage;
use crate::inference::sse::SseReader;
use crate::inference::{CompletionProvider, CompletionRequest, ProviderError, StreamChunk};

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

// ============================================================================
// Messages API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [WireMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: BlockDelta },
    MessageDelta { delta: MessageDeltaBody },
    MessageStop,
    Error { error: ApiErrorBody },
    /// message_start, content_block_start/stop, ping, ...
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Maps an in-stream error event onto the same shape as an HTTP failure, so
/// rate limits and auth problems classify the same way either path.
fn stream_error(body: ApiErrorBody) -> ProviderError {
    let status = match body.error_type.as_str() {
        "authentication_error" => Some(401),
        "permission_error" => Some(403),
        "rate_limit_error" => Some(429),
        _ => None,
    };
    match status {
        Some(status) => ProviderError::Api {
            status,
            message: body.message,
        },
        None => ProviderError::Stream(format!("{}: {}", body.error_type, body.message)),
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>, max_tokens: u32) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    async fn send_request(
        &self,
        request: &MessagesRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        let json_body = serde_json::to_string(request)
            .map_err(|e| ProviderError::Parse(format!("Request serialization failed: {e}")))?;
        debug!("Raw Anthropic request: {}", json_body);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .body(json_body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("Anthropic response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Anthropic API error: {} - {}", status, err_body);
            return Err(ProviderError::Api {
                status,
                message: err_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let messages_request = MessagesRequest {
            model: request.model,
            system: request.system,
            messages: request.messages,
            max_tokens: self.max_tokens,
            stream: true,
        };

        info!(
            "Anthropic request: model={}, message_count={}, max_tokens={}",
            request.model,
            request.messages.len(),
            self.max_tokens
        );

        let response = self.send_request(&messages_request).await?;
        let mut reader = SseReader::new(response);
        let mut chunk_count = 0usize;

        while let Some(data) = reader.next_data().await? {
            let event = match serde_json::from_str::<StreamEvent>(&data) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Skipping unparseable SSE data ({e}): {data}");
                    continue;
                }
            };

            match event {
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::TextDelta { text },
                } => {
                    if text.is_empty() {
                        continue;
                    }
                    chunk_count += 1;
                    if sender.send(StreamChunk::Text(text)).await.is_err() {
                        warn!("Content chunk send failed: receiver dropped");
                        return Err(ProviderError::ChannelClosed);
                    }
                }
                StreamEvent::MessageDelta { delta } => {
                    if let Some(reason) = delta.stop_reason
                        && sender.send(StreamChunk::Stop(reason)).await.is_err()
                    {
                        return Err(ProviderError::ChannelClosed);
                    }
                }
                StreamEvent::MessageStop => {
                    info!("Stream complete: {} chunks", chunk_count);
                    return Ok(());
                }
                StreamEvent::Error { error } => {
                    warn!("Anthropic stream error: {} - {}", error.error_type, error.message);
                    return Err(stream_error(error));
                }
                StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => {}
            }
        }

        info!("Stream ended without message_stop: {} chunks", chunk_count);
        Ok(())
    }
}
