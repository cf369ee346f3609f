//! Error taxonomy shared across the hub. Individual crates define their
//! own `thiserror` enums for their seams (`hub_llm::GatewayError`,
//! `hub_store::StoreError`, `hub_tools::ToolError`, ...); `HubError`
//! is the common currency they get folded into at crate boundaries so
//! `hub-orchestrator` has one thing to match on when deciding whether a
//! turn can continue.

use thiserror::Error;

/// The kinds named in `SPEC_FULL.md` §7. Each variant documents its own
/// propagation policy.
#[derive(Debug, Error)]
pub enum HubError {
    /// Network/timeout talking to a provider. Retried by the gateway;
    /// surfaces after retry exhaustion.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-retryable rejection from a provider (bad key, quota, content
    /// filter). Triggers fallback if enabled.
    #[error("provider rejected request: {0}")]
    ProviderRejection(String),

    /// Malformed webhook, missing required field, dimension mismatch.
    /// Returned as 4xx at ingress.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing/expired token or bad credentials. 401/403 at ingress, WS
    /// close 1008.
    #[error("auth error: {0}")]
    Auth(String),

    /// Informational: a duplicate webhook delivery was suppressed.
    #[error("duplicate delivery for id {0}")]
    DedupHit(String),

    /// No provider/flow available, or a configuration invariant (e.g.
    /// mismatched KB embedding dimensions) is violated. The turn proceeds
    /// with defaults where possible, otherwise emits an apology message.
    #[error("configuration error: {0}")]
    Config(String),

    /// The relational store is unavailable. Critical before ack; logged
    /// and swallowed after ack.
    #[error("store error: {0}")]
    Store(String),

    /// The outbound queue broker is unavailable. Logged CRITICAL; never
    /// fails the turn or the webhook ack.
    #[error("queue error: {0}")]
    Queue(String),

    /// Tool parameter validation, handler failure, or timeout. Persisted
    /// as an execution row; the orchestrator continues so the LLM can
    /// recover.
    #[error("tool error: {0}")]
    Tool(String),
}

impl HubError {
    /// The natural-language message shown to the end user. Never a
    /// `Debug`-formatted error.
    pub fn user_message(&self) -> &'static str {
        "Sorry, an error occurred processing your message, please try again."
    }
}
