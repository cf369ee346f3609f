//! Embedding provider trait — the abstraction `hub-rag` embeds query text
//! and ingested document chunks through.

use async_trait::async_trait;

use crate::EmbedderError;

/// Every embedding backend (OpenAI, any OpenAI-compatible `/embeddings`
/// endpoint) implements this trait. `HttpEmbeddingProvider` covers all of
/// them; there's no per-vendor struct.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in the same
    /// order. Callers must never pass an empty `texts` slice — RAG's
    /// empty-query short-circuit happens before this trait is reached.
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
