use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("authentication timed out")]
    AuthTimeout,

    #[error("invalid or expired token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Store(#[from] hub_store::StoreError),
}
