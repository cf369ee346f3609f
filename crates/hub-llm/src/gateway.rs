//! `Gateway` — the provider-agnostic completion surface the orchestrator
//! talks to. Owns the configured provider set, the selection strategy,
//! one `CircuitBreaker` per provider, and the retry/fallback loop. The
//! registry (`registry.rs`) and `HttpProvider` (`http_provider.rs`)
//! answer "how do I talk to provider X"; this answers "which provider do
//! I talk to, and is it healthy".

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use hub_core::config::schema::{GatewayConfig, ProviderConfig, SelectionStrategy};
use hub_core::llm::{LlmResponse, Message, ToolDefinition};

use crate::circuit_breaker::CircuitBreaker;
use crate::http_provider::HttpProvider;
use crate::registry::{self, ProviderSpec};
use crate::traits::{LlmProvider, LlmRequestConfig};
use crate::GatewayError;

/// Rolling window size for the least-latency strategy.
const LATENCY_WINDOW: usize = 100;

struct ProviderEntry {
    provider: HttpProvider,
    spec: &'static ProviderSpec,
    priority: i32,
    price_in_per_million: f64,
    price_out_per_million: f64,
    breaker: CircuitBreaker,
    latencies: Mutex<VecDeque<Duration>>,
}

impl ProviderEntry {
    async fn record_latency(&self, d: Duration) {
        let mut window = self.latencies.lock().await;
        window.push_back(d);
        if window.len() > LATENCY_WINDOW {
            window.pop_front();
        }
    }

    async fn avg_latency(&self) -> f64 {
        let window = self.latencies.lock().await;
        if window.is_empty() {
            return f64::INFINITY;
        }
        let total: Duration = window.iter().sum();
        total.as_secs_f64() / window.len() as f64
    }

    fn cost_per_million(&self) -> f64 {
        self.price_in_per_million + self.price_out_per_million
    }
}

pub struct Gateway {
    config: GatewayConfig,
    providers: HashMap<&'static str, ProviderEntry>,
    rr_counter: AtomicUsize,
}

impl Gateway {
    pub fn new(provider_configs: HashMap<String, ProviderConfig>, config: GatewayConfig) -> Self {
        let mut providers = HashMap::new();
        for (name, cfg) in provider_configs {
            if cfg.api_key.is_empty() {
                continue;
            }
            let Some(spec) = registry::find_by_name(&name) else {
                warn!(provider = name, "Unknown provider name in config, skipping");
                continue;
            };
            let provider = HttpProvider::new(&cfg, spec, "");
            providers.insert(
                spec.name,
                ProviderEntry {
                    provider,
                    spec,
                    priority: cfg.priority,
                    price_in_per_million: cfg.price_in_per_million,
                    price_out_per_million: cfg.price_out_per_million,
                    breaker: CircuitBreaker::new(
                        config.circuit_breaker_threshold,
                        Duration::from_secs(config.circuit_breaker_reset_secs),
                    ),
                    latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                },
            );
        }

        Gateway {
            config,
            providers,
            rr_counter: AtomicUsize::new(0),
        }
    }

    /// Candidate providers for `model`: the direct keyword match (if
    /// configured) plus every configured gateway provider as fallback,
    /// mirroring `registry::match_provider`'s resolution order but
    /// keeping the full list instead of just the first hit.
    fn candidates_for_model(&self, model: &str) -> Vec<&ProviderEntry> {
        let mut names: Vec<&'static str> = Vec::new();
        if let Some(spec) = registry::find_by_model(model) {
            if self.providers.contains_key(spec.name) {
                names.push(spec.name);
            }
        }
        for entry in self.providers.values() {
            if entry.spec.is_gateway && !names.contains(&entry.spec.name) {
                names.push(entry.spec.name);
            }
        }
        names.into_iter().filter_map(|n| self.providers.get(n)).collect()
    }

    async fn order_candidates<'a>(&self, mut candidates: Vec<&'a ProviderEntry>) -> Vec<&'a ProviderEntry> {
        match self.config.selection_strategy {
            SelectionStrategy::Priority => {
                candidates.sort_by_key(|e| e.priority);
            }
            SelectionStrategy::LeastCost => {
                candidates.sort_by(|a, b| {
                    a.cost_per_million()
                        .partial_cmp(&b.cost_per_million())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            SelectionStrategy::LeastLatency => {
                let mut with_latency = Vec::with_capacity(candidates.len());
                for entry in candidates {
                    with_latency.push((entry.avg_latency().await, entry));
                }
                with_latency.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                candidates = with_latency.into_iter().map(|(_, e)| e).collect();
            }
            SelectionStrategy::RoundRobin => {
                if !candidates.is_empty() {
                    let start = self.rr_counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
                    candidates.rotate_left(start);
                }
            }
        }
        candidates
    }

    /// Whether any configured provider capable of serving `model` has a
    /// closed or half-open circuit right now.
    pub async fn is_healthy(&self, model: &str) -> bool {
        for entry in self.candidates_for_model(model) {
            if entry.breaker.is_healthy().await {
                return true;
            }
        }
        false
    }

    /// Runs one chat completion, trying candidates in selection order
    /// with per-provider retry and (if enabled) fallback across the
    /// remaining healthy candidates.
    pub async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        req_config: &LlmRequestConfig,
    ) -> Result<LlmResponse, GatewayError> {
        let candidates = self.candidates_for_model(model);
        if candidates.is_empty() {
            return Err(GatewayError::NoProvider(model.to_string()));
        }
        let ordered = self.order_candidates(candidates).await;

        let mut last_error: Option<String> = None;
        for entry in &ordered {
            if !entry.breaker.allow_request().await {
                debug!(provider = entry.spec.display_name, "Circuit open, skipping");
                continue;
            }

            match self.call_with_retry(entry, messages, tools, model, req_config).await {
                Ok(resp) => return Ok(resp),
                Err(msg) => {
                    last_error = Some(msg);
                    if !self.config.enable_fallback {
                        break;
                    }
                }
            }
        }

        Err(GatewayError::AllProvidersFailed(
            last_error.unwrap_or_else(|| model.to_string()),
        ))
    }

    /// Retries one provider up to `retry_attempts` times with exponential
    /// backoff starting at `retry_delay_ms`. A failure after the final
    /// attempt counts as one circuit-breaker failure.
    async fn call_with_retry(
        &self,
        entry: &ProviderEntry,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        req_config: &LlmRequestConfig,
    ) -> Result<LlmResponse, String> {
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        for attempt in 0..=self.config.retry_attempts {
            let start = Instant::now();
            let resp = entry.provider.chat(messages, tools, model, req_config).await;
            entry.record_latency(start.elapsed()).await;

            if !resp.is_error {
                entry.breaker.record_success().await;
                return Ok(resp);
            }

            if attempt < self.config.retry_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            } else {
                entry.breaker.record_failure().await;
                return Err(resp.content.unwrap_or_else(|| "unknown error".to_string()));
            }
        }

        unreachable!("loop always returns on its final iteration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn success_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        })
    }

    fn provider_config(api_key: &str, api_base: &str, priority: i32) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.to_string(),
            api_base: Some(api_base.to_string()),
            priority,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_providers_configured() {
        let gateway = Gateway::new(HashMap::new(), GatewayConfig::default());
        let err = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoProvider(_)));
    }

    #[tokio::test]
    async fn test_complete_success_single_provider() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("hello back")))
            .mount(&mock_server)
            .await;

        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &mock_server.uri(), 0));

        let gateway = Gateway::new(configs, GatewayConfig::default());
        let resp = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("hello back"));
    }

    #[tokio::test]
    async fn test_fallback_to_second_provider_on_failure() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&primary)
            .await;

        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("from fallback")))
            .mount(&fallback)
            .await;

        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &primary.uri(), 0));
        configs.insert("openrouter".to_string(), provider_config("sk-or-x", &fallback.uri(), 1));

        let mut gw_config = GatewayConfig::default();
        gw_config.retry_attempts = 0;
        let gateway = Gateway::new(configs, gw_config);

        let resp = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("from fallback"));
    }

    #[tokio::test]
    async fn test_no_fallback_when_disabled() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&primary)
            .await;

        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("from fallback")))
            .mount(&fallback)
            .await;

        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &primary.uri(), 0));
        configs.insert("openrouter".to_string(), provider_config("sk-or-x", &fallback.uri(), 1));

        let mut gw_config = GatewayConfig::default();
        gw_config.retry_attempts = 0;
        gw_config.enable_fallback = false;
        let gateway = Gateway::new(configs, gw_config);

        let err = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn test_all_providers_failed_opens_circuit() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &server.uri(), 0));

        let mut gw_config = GatewayConfig::default();
        gw_config.retry_attempts = 0;
        gw_config.circuit_breaker_threshold = 1;
        let gateway = Gateway::new(configs, gw_config);

        let _ = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await;

        // Circuit now open — second call should fail fast with NoProvider-equivalent
        let err = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn test_is_healthy_false_with_no_providers() {
        let gateway = Gateway::new(HashMap::new(), GatewayConfig::default());
        assert!(!gateway.is_healthy("gpt-4o").await);
    }

    #[tokio::test]
    async fn test_is_healthy_true_when_circuit_closed() {
        let server = MockServer::start().await;
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &server.uri(), 0));
        let gateway = Gateway::new(configs, GatewayConfig::default());
        assert!(gateway.is_healthy("gpt-4o").await);
    }

    #[tokio::test]
    async fn test_priority_strategy_orders_by_priority() {
        let high = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("high priority")))
            .mount(&high)
            .await;

        let low = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("low priority")))
            .mount(&low)
            .await;

        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config("key", &low.uri(), 5));
        configs.insert("openrouter".to_string(), provider_config("sk-or-x", &high.uri(), 0));

        let mut gw_config = GatewayConfig::default();
        gw_config.selection_strategy = SelectionStrategy::Priority;
        let gateway = Gateway::new(configs, gw_config);

        let resp = gateway
            .complete(&[Message::user("hi")], None, "gpt-4o", &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("high priority"));
    }
}
