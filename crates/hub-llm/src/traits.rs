//! LLM Provider trait — the core abstraction every backend implements.
//! The `HttpProvider` in `http_provider.rs` covers all OpenAI-compatible
//! APIs; there's no per-vendor struct.

use async_trait::async_trait;
use hub_core::llm::{LlmResponse, Message, ToolDefinition};

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Trait every LLM provider implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// On API errors, returns `LlmResponse::error(...)` instead of
    /// propagating — the caller (the `Gateway`) inspects `is_error` to
    /// drive retry/circuit-breaker decisions without a `Result` seam.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
