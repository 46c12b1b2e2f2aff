//! Wayfarer library exports for the binary and integration tests.

use clap::ValueEnum;

pub mod client;
pub mod core;
pub mod inference;
pub mod server;
pub mod stream;

#[cfg(test)]
pub mod test_support;

/// Completion service selectable with `--provider`.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Provider {
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
}

impl Provider {
    /// The selector string understood by the config layer.
    pub fn selector(self) -> &'static str {
        match self {
            Provider::OpenAi => inference::ProviderKind::OpenAi.label(),
            Provider::Anthropic => inference::ProviderKind::Anthropic.label(),
        }
    }
}
