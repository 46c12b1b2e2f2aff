pub mod provider;
pub mod providers;
pub mod sse;
pub mod types;

use std::sync::Arc;

pub use provider::{CompletionProvider, CompletionRequest, ProviderError};
pub use providers::{AnthropicProvider, OpenAiProvider};
pub use types::{ErrorClass, ProviderKind, StreamChunk};

use crate::core::config::ResolvedConfig;

/// Build the provider selected by a resolved config.
pub fn build_provider(config: &ResolvedConfig) -> Arc<dyn CompletionProvider> {
    match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            config.openai_api_key.clone(),
            Some(config.openai_base_url.clone()),
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            config.anthropic_api_key.clone(),
            Some(config.anthropic_base_url.clone()),
            config.anthropic_max_tokens,
        )),
    }
}
