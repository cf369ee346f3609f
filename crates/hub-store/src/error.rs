use thiserror::Error;

/// The store's own typed error, folded into `hub_core::HubError::Store`
/// at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<StoreError> for hub_core::HubError {
    fn from(e: StoreError) -> Self {
        hub_core::HubError::Store(e.to_string())
    }
}
