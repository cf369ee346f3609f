//! Embedding provider abstraction used by `hub-rag` to turn text into
//! vectors for both document ingest and query-time similarity search.
//! Same sealed-spec-plus-factory shape as `hub_llm`'s provider registry,
//! narrowed to the embeddings endpoint.

mod error;
pub mod http_provider;
pub mod registry;
mod traits;

pub use error::EmbedderError;
pub use http_provider::{create_provider, HttpEmbeddingProvider};
pub use registry::{ProviderConfig, ProviderSpec};
pub use traits::EmbeddingProvider;
