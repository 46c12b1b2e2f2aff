//! Minimal server-sent-events reader shared by the providers.
//!
//! Only `data:` payloads matter to us. Event names are carried inside the
//! JSON by both OpenAI and Anthropic, so `event:` lines, comments and blank
//! separators are dropped.

use std::collections::VecDeque;

use log::debug;

use super::ProviderError;
use crate::stream::decoder::LineDecoder;

pub struct SseReader {
    response: reqwest::Response,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Returns the next `data:` payload, or `None` at end of body.
    pub async fn next_data(&mut self) -> Result<Option<String>, ProviderError> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                return Ok(Some(data));
            }
            if self.finished {
                return Ok(None);
            }

            let lines = match self
                .response
                .chunk()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?
            {
                Some(chunk) => {
                    debug!("Raw chunk received: {} bytes", chunk.len());
                    self.decoder.push(&chunk)
                }
                None => {
                    self.finished = true;
                    self.decoder.finish()
                }
            };

            self.pending.extend(lines.into_iter().filter_map(data_payload));
        }
    }
}

fn data_payload(line: String) -> Option<String> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}
