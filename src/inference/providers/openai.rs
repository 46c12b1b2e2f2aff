//! OpenAI provider using the Chat Completions API.
//!
//! The system instruction travels as the first message. Streamed replies are
//! SSE `data:` lines carrying `choices[0].delta.content`, closed by `[DONE]`.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::core::turn::Role as TurnRole;
use crate::inference::sse::SseReader;
use crate::inference::{CompletionProvider, CompletionRequest, ProviderError, StreamChunk};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Debug, Clone)]
struct Message {
    role: Role,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// In-stream error payload (`data: {"error": {...}}`).
#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

fn to_messages(request: &CompletionRequest<'_>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(Message {
            role: Role::System,
            content: request.system.to_string(),
        });
    }
    messages.extend(request.messages.iter().map(|m| Message {
        role: match m.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        },
        content: m.content.clone(),
    }));
    messages
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new OpenAI provider.
    ///
    /// A missing key is reported per request as `ProviderError::Config`, so
    /// the server can start without credentials.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let json_body = serde_json::to_string(request)
            .map_err(|e| ProviderError::Parse(format!("Request serialization failed: {e}")))?;
        debug!("Raw OpenAI request: {}", json_body);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .body(json_body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("OpenAI response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("OpenAI API error: {} - {}", status, err_body);
            return Err(ProviderError::Api {
                status,
                message: err_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let chat_request = ChatRequest {
            model: request.model.to_string(),
            messages: to_messages(&request),
            stream: true,
        };

        info!(
            "OpenAI request: model={}, message_count={}",
            request.model,
            chat_request.messages.len()
        );

        let response = self.send_request(&chat_request).await?;
        let mut reader = SseReader::new(response);
        let mut chunk_count = 0usize;
        let mut total_content_len = 0usize;

        while let Some(data) = reader.next_data().await? {
            if data == "[DONE]" {
                info!(
                    "Stream complete: {} chunks, {} content bytes",
                    chunk_count, total_content_len
                );
                return Ok(());
            }

            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&data) {
                warn!("OpenAI stream error: {}", envelope.error.message);
                return Err(ProviderError::Stream(envelope.error.message));
            }

            let chunk = match serde_json::from_str::<ChatChunk>(&data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("Skipping unparseable SSE data ({e}): {data}");
                    continue;
                }
            };

            for choice in chunk.choices {
                if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                    chunk_count += 1;
                    total_content_len += text.len();
                    if sender.send(StreamChunk::Text(text)).await.is_err() {
                        warn!("Content chunk send failed: receiver dropped");
                        return Err(ProviderError::ChannelClosed);
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    debug!("OpenAI finish_reason: {}", reason);
                    if sender.send(StreamChunk::Stop(reason)).await.is_err() {
                        return Err(ProviderError::ChannelClosed);
                    }
                }
            }
        }

        info!(
            "Stream ended without [DONE]: {} chunks, {} content bytes",
            chunk_count, total_content_len
        );
        Ok(())
    }
}
