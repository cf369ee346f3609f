use thiserror::Error;

/// Fatal conditions per `SPEC_FULL.md` §4.5 — everything else (RAG
/// failure, a single tool execution error) is absorbed and the turn
/// continues.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no LLM providers available")]
    NoProvidersAvailable,

    #[error("tool execution loop exceeded bound of {0}")]
    ToolLoopExceeded(u32),

    #[error("context manager could not load history: {0}")]
    HistoryUnavailable(String),

    #[error(transparent)]
    Store(#[from] hub_store::StoreError),
}

impl From<OrchestratorError> for hub_core::HubError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Store(e) => hub_core::HubError::Store(e.to_string()),
            other => hub_core::HubError::Config(other.to_string()),
        }
    }
}
