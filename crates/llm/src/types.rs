//! Provider identification.

/// Generator backends the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    OpenAI,
    DashScope,
    Moonshot,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAI),
            "dashscope" | "qwen" => Some(Self::DashScope),
            "moonshot" | "kimi" => Some(Self::Moonshot),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::DashScope => "dashscope",
            Self::Moonshot => "moonshot",
        }
    }

    /// API root used when no endpoint is configured.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => crate::providers::ollama::DEFAULT_OLLAMA_URL,
            Self::OpenAI => "https://api.openai.com/v1",
            Self::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Self::Moonshot => "https://api.moonshot.cn/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("ollama"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("OpenAI"), Some(ProviderType::OpenAI));
        assert_eq!(ProviderType::parse("dashscope"), Some(ProviderType::DashScope));
        assert_eq!(ProviderType::parse("kimi"), Some(ProviderType::Moonshot));
        assert_eq!(ProviderType::parse("unknown"), None);
    }

    #[test]
    fn test_only_ollama_is_keyless() {
        assert!(!ProviderType::Ollama.requires_api_key());
        assert!(ProviderType::Moonshot.requires_api_key());
        assert_eq!(ProviderType::Moonshot.as_str(), "moonshot");
    }
}
