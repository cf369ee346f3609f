use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel '{0}' not configured")]
    NotConfigured(String),

    #[error("channel '{0}' request failed: {1}")]
    RequestFailed(String, String),

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("unrecognized webhook payload shape")]
    UnknownPayload,

    #[error(transparent)]
    Store(#[from] hub_store::StoreError),
}
