use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("flow has no active knowledge bases")]
    NoKnowledgeBases,
    #[error("knowledge bases bound to one flow must share one embedding model, found '{0}' and '{1}'")]
    MismatchedEmbeddingModel(String, String),
    #[error("embedding provider error: {0}")]
    Embedder(#[from] hub_embedder::EmbedderError),
    #[error("store error: {0}")]
    Store(#[from] hub_store::StoreError),
}

impl From<RagError> for hub_core::HubError {
    fn from(e: RagError) -> Self {
        hub_core::HubError::Config(e.to_string())
    }
}
