//! Generic HTTP-based embedding provider for OpenAI-compatible
//! `/embeddings` endpoints. Mirrors `hub_llm::http_provider::HttpProvider`,
//! narrowed to one endpoint and no tool-call/chat machinery.

use async_trait::async_trait;
use hub_core::llm::{EmbeddingRequest, EmbeddingResponse};
use tracing::{debug, error};

use crate::registry::ProviderSpec;
use crate::traits::EmbeddingProvider;
use crate::EmbedderError;

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    default_model: String,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl HttpEmbeddingProvider {
    pub fn new(config: &crate::registry::ProviderConfig, spec: &'static ProviderSpec, model: &str) -> Self {
        let api_base = config
            .api_base
            .clone()
            .or_else(|| spec.default_api_base.map(String::from))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        HttpEmbeddingProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            spec,
        }
    }

    fn embeddings_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/embeddings", base)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, EmbedderError> {
        debug!(
            provider = self.spec.display_name,
            model,
            batch = texts.len(),
            "Requesting embeddings"
        );

        let request_body = EmbeddingRequest {
            model: model.to_string(),
            input: texts.to_vec(),
        };

        let url = self.embeddings_url();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = self.spec.display_name, error = %e, "Embedding request failed");
                EmbedderError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            error!(provider = self.spec.display_name, status = %status, body = %body, "Embedding API error");
            return Err(EmbedderError::ProviderRejection(format!("{} — {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::Transport(format!("failed to parse embedding response: {}", e)))?;

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

/// Build an `HttpEmbeddingProvider` from a model name and a map of
/// provider configs, matching the model to a configured provider.
pub fn create_provider(
    model: &str,
    providers: &std::collections::HashMap<String, crate::registry::ProviderConfig>,
) -> Result<HttpEmbeddingProvider, EmbedderError> {
    let (config, spec) = crate::registry::match_provider(model, providers)
        .ok_or_else(|| EmbedderError::NoProvider(model.to_string()))?;

    debug!(
        provider = spec.display_name,
        model,
        api_base = config.api_base.as_deref().unwrap_or("default"),
        "Creating embedding provider"
    );

    Ok(HttpEmbeddingProvider::new(config, spec, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{find_by_name, ProviderConfig};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_key: &str, api_base: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.to_string(),
            api_base: api_base.map(String::from),
        }
    }

    #[test]
    fn test_embeddings_url_trailing_slash() {
        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some("https://api.openai.com/v1/"));
        let provider = HttpEmbeddingProvider::new(&config, spec, "text-embedding-3-small");
        assert_eq!(provider.embeddings_url(), "https://api.openai.com/v1/embeddings");
    }

    #[tokio::test]
    async fn test_embed_success_preserves_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.2, 0.3], "index": 1},
                    {"embedding": [0.1, 0.1], "index": 0}
                ],
                "usage": {"prompt_tokens": 6, "completion_tokens": 0, "total_tokens": 6}
            })))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpEmbeddingProvider::new(&config, spec, "text-embedding-3-small");

        let texts = vec!["first".to_string(), "second".to_string()];
        let vectors = provider.embed(&texts, "text-embedding-3-small").await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.1]);
        assert_eq!(vectors[1], vec![0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "invalid api key"}
            })))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("openai").unwrap();
        let config = make_config("bad-key", Some(&mock_server.uri()));
        let provider = HttpEmbeddingProvider::new(&config, spec, "text-embedding-3-small");

        let texts = vec!["hello".to_string()];
        let err = provider.embed(&texts, "text-embedding-3-small").await.unwrap_err();
        assert!(matches!(err, EmbedderError::ProviderRejection(_)));
    }

    #[tokio::test]
    async fn test_embed_network_error() {
        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some("http://127.0.0.1:1"));
        let provider = HttpEmbeddingProvider::new(&config, spec, "text-embedding-3-small");

        let texts = vec!["hello".to_string()];
        let err = provider.embed(&texts, "text-embedding-3-small").await.unwrap_err();
        assert!(matches!(err, EmbedderError::Transport(_)));
    }

    #[tokio::test]
    async fn test_embed_sends_correct_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0], "index": 0}],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpEmbeddingProvider::new(&config, spec, "text-embedding-3-small");

        let texts = vec!["body check".to_string()];
        let vectors = provider.embed(&texts, "text-embedding-3-small").await.unwrap();
        assert_eq!(vectors, vec![vec![1.0]]);
    }

    #[test]
    fn test_create_provider_no_config() {
        let providers = std::collections::HashMap::new();
        let err = create_provider("text-embedding-3-small", &providers).unwrap_err();
        assert!(matches!(err, EmbedderError::NoProvider(_)));
    }

    #[test]
    fn test_create_provider_success() {
        let mut providers = std::collections::HashMap::new();
        providers.insert("openai".to_string(), make_config("sk-test", None));
        let provider = create_provider("text-embedding-3-small", &providers).unwrap();
        assert_eq!(provider.display_name(), "OpenAI");
    }
}
