use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no provider configured for model '{0}'")]
    NoProvider(String),
    #[error("all providers failed for model '{0}'")]
    AllProvidersFailed(String),
    #[error("provider '{0}' circuit is open")]
    CircuitOpen(String),
}

impl From<GatewayError> for hub_core::HubError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NoProvider(m) => hub_core::HubError::Config(m),
            GatewayError::AllProvidersFailed(m) => hub_core::HubError::ProviderRejection(m),
            GatewayError::CircuitOpen(m) => hub_core::HubError::ProviderRejection(m),
        }
    }
}
