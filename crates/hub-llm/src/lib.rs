//! Provider-agnostic LLM access: a static provider registry plus an
//! OpenAI-compatible HTTP transport (`registry`/`http_provider`), and a
//! `Gateway` on top that adds provider selection, per-provider circuit
//! breaking, and retry/fallback across multiple concurrently configured
//! providers.

mod circuit_breaker;
mod error;
pub mod gateway;
pub mod http_provider;
pub mod registry;
mod traits;

pub use circuit_breaker::CircuitBreaker;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http_provider::{create_provider, HttpProvider};
pub use registry::ProviderSpec;
pub use traits::{LlmProvider, LlmRequestConfig};
