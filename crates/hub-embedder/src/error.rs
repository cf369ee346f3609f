use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("no configured embedding provider for model '{0}'")]
    NoProvider(String),
    #[error("embedding request failed: {0}")]
    Transport(String),
    #[error("embedding provider returned an error: {0}")]
    ProviderRejection(String),
}

impl From<EmbedderError> for hub_core::HubError {
    fn from(e: EmbedderError) -> Self {
        match e {
            EmbedderError::NoProvider(m) => hub_core::HubError::Config(m),
            EmbedderError::Transport(m) => hub_core::HubError::Transport(m),
            EmbedderError::ProviderRejection(m) => hub_core::HubError::ProviderRejection(m),
        }
    }
}
