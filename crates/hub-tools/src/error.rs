use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("tool '{0}' is not permitted on channel '{1}'")]
    PermissionDenied(String, String),

    #[error("tool '{0}' rate limit exceeded")]
    RateLimited(String),

    #[error("tool '{0}' timed out after {1}ms")]
    Timeout(String, u64),

    #[error("tool '{0}' handler failed: {1}")]
    HandlerFailed(String, String),

    #[error("sql tool '{0}': unsupported database type '{1}'")]
    UnsupportedDatabase(String, String),
}

impl From<ToolError> for hub_core::HubError {
    fn from(e: ToolError) -> Self {
        hub_core::HubError::Tool(e.to_string())
    }
}
