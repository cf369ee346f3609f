//! Embedding provider registry — static specs, same shape as
//! `hub_llm::registry` but narrowed to providers that expose an
//! embeddings endpoint.

/// Static specification describing one embedding provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name (e.g. `"openai"`).
    pub name: &'static str,
    /// Keywords to match in model names (lowercase).
    pub keywords: &'static [&'static str],
    /// Environment variable for the API key.
    pub env_key: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Default API base URL.
    pub default_api_base: Option<&'static str>,
    /// Whether this is a local/self-hosted provider.
    pub is_local: bool,
}

/// Configuration for one embedding provider instance.
#[derive(Clone, Debug, Default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() || self.api_base.is_some()
    }
}

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        keywords: &["openai", "text-embedding"],
        env_key: "OPENAI_API_KEY",
        display_name: "OpenAI",
        default_api_base: None,
        is_local: false,
    },
    ProviderSpec {
        name: "dashscope",
        keywords: &["dashscope", "qwen"],
        env_key: "DASHSCOPE_API_KEY",
        display_name: "DashScope",
        default_api_base: Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        is_local: false,
    },
    ProviderSpec {
        name: "vllm",
        keywords: &["vllm", "bge", "e5"],
        env_key: "HOSTED_VLLM_API_KEY",
        display_name: "vLLM",
        default_api_base: None,
        is_local: true,
    },
];

/// Find a provider spec by matching keywords against a model name. Local
/// providers only match when no other spec claims the keyword, same as
/// the LLM registry's gateway/local fallback rule.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS
        .iter()
        .find(|spec| !spec.is_local && spec.keywords.iter().any(|kw| model_lower.contains(kw)))
        .or_else(|| {
            PROVIDERS
                .iter()
                .find(|spec| spec.is_local && spec.keywords.iter().any(|kw| model_lower.contains(kw)))
        })
}

pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Match a model name to a configured provider, mirroring
/// `hub_llm::registry::match_provider`'s direct-keyword-then-fallback order.
pub fn match_provider<'a>(
    model: &str,
    providers: &'a std::collections::HashMap<String, ProviderConfig>,
) -> Option<(&'a ProviderConfig, &'static ProviderSpec)> {
    if let Some(spec) = find_by_model(model) {
        if let Some(config) = providers.get(spec.name) {
            if config.is_configured() {
                return Some((config, spec));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_model_openai() {
        let spec = find_by_model("text-embedding-3-small").unwrap();
        assert_eq!(spec.name, "openai");
    }

    #[test]
    fn test_find_by_model_qwen() {
        let spec = find_by_model("qwen-embedding-v1").unwrap();
        assert_eq!(spec.name, "dashscope");
    }

    #[test]
    fn test_find_by_model_local() {
        let spec = find_by_model("bge-large-en").unwrap();
        assert_eq!(spec.name, "vllm");
    }

    #[test]
    fn test_find_by_model_unknown() {
        assert!(find_by_model("some-random-embedding").is_none());
    }

    #[test]
    fn test_match_provider_no_key() {
        let providers = std::collections::HashMap::new();
        assert!(match_provider("text-embedding-3-small", &providers).is_none());
    }

    #[test]
    fn test_match_provider_configured() {
        let mut providers = std::collections::HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_key: "sk-test".to_string(),
                api_base: None,
            },
        );
        let (config, spec) = match_provider("text-embedding-3-small", &providers).unwrap();
        assert_eq!(spec.name, "openai");
        assert_eq!(config.api_key, "sk-test");
    }
}
