use serde::{Deserialize, Serialize};

/// A piece of a streamed provider reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    /// The provider reported why it stopped (e.g. "stop", "end_turn", "max_tokens").
    Stop(String),
}

/// How a provider failure is presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or rejected credentials, bad provider settings.
    Configuration,
    RateLimited,
    Other,
}

/// Which completion service the proxy talks to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Parses a selector value. Unknown names fall back to OpenAI.
    pub fn from_selector(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => ProviderKind::Anthropic,
            _ => ProviderKind::OpenAi,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4-turbo-preview",
            ProviderKind::Anthropic => "claude-3-sonnet-20240229",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!(ProviderKind::from_selector("anthropic"), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_selector(" Anthropic "), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_selector("openai"), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_selector("mistral"), ProviderKind::OpenAi);
    }

    #[test]
    fn test_default_models() {
        assert_eq!(ProviderKind::OpenAi.default_model(), "gpt-4-turbo-preview");
        assert_eq!(ProviderKind::Anthropic.default_model(), "claude-3-sonnet-20240229");
    }

    #[test]
    fn test_kind_deserializes_lowercase() {
        let kind: ProviderKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
    }
}
