//! Hosting provider resolution from model identifiers

use std::fmt;

/// Provider that hosts a model, as stored in `model_pricing.hosting_provider`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostingProvider {
    Azure,
    OpenAi,
    Anthropic,
    Together,
    Unknown,
}

impl HostingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Together => "together",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HostingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a model identifier into its hosting provider
///
/// Rules are checked in order, case-insensitively. An Azure marker wins
/// over OpenAI model prefixes.
pub fn classify_provider(model: &str) -> HostingProvider {
    let model_lower = model.to_lowercase();

    if model_lower.contains("azure") {
        HostingProvider::Azure
    } else if model_lower.starts_with("gpt-")
        || model_lower.starts_with("text-")
        || model_lower.starts_with("davinci")
    {
        HostingProvider::OpenAi
    } else if model_lower.starts_with("claude-") {
        HostingProvider::Anthropic
    } else if model_lower.contains("together") {
        HostingProvider::Together
    } else {
        tracing::warn!(model, "Unknown hosting provider for model");
        HostingProvider::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_prefixes() {
        assert_eq!(classify_provider("gpt-4-turbo"), HostingProvider::OpenAi);
        assert_eq!(
            classify_provider("text-embedding-3-small"),
            HostingProvider::OpenAi
        );
        assert_eq!(classify_provider("davinci-002"), HostingProvider::OpenAi);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_provider("GPT-4o"), HostingProvider::OpenAi);
        assert_eq!(
            classify_provider("Claude-3-Opus-20240229"),
            HostingProvider::Anthropic
        );
    }

    #[test]
    fn test_azure_overrides_gpt_prefix() {
        assert_eq!(classify_provider("gpt-4-azure"), HostingProvider::Azure);
        assert_eq!(
            classify_provider("azure/gpt-35-turbo"),
            HostingProvider::Azure
        );
    }

    #[test]
    fn test_together_and_unknown() {
        assert_eq!(
            classify_provider("together/llama-3-70b"),
            HostingProvider::Together
        );
        assert_eq!(classify_provider("mistral-large"), HostingProvider::Unknown);
        assert_eq!(classify_provider(""), HostingProvider::Unknown);
    }

    #[test]
    fn test_claude_requires_prefix() {
        // "claude" elsewhere in the name is not a prefix match
        assert_eq!(classify_provider("my-claude-3"), HostingProvider::Unknown);
    }

    #[test]
    fn test_as_str() {
        assert_eq!(HostingProvider::OpenAi.as_str(), "openai");
        assert_eq!(HostingProvider::Anthropic.to_string(), "anthropic");
    }
}
