//! Channel adapter trait. Adapters here are webhook-driven rather than
//! long-running pollers/bridges (email is the one exception, which still
//! polls IMAP on an interval), so the lifecycle is `initialize`/`shutdown`
//! rather than `start`/`stop`, with `handle_webhook`/`is_healthy` added for
//! webhook normalization and the `/health` endpoint.

use async_trait::async_trait;
use hub_core::bus::NormalizedMessage;
use serde_json::Value;

use crate::error::ChannelError;

/// Per-call override of provider credentials — lets one adapter instance
/// serve many tenants (one `WhatsAppChannel` serving every 360dialog/
/// Ultramsg/Twilio instance configured, selected by channel config id).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverride {
    pub channel_config_id: Option<uuid::Uuid>,
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name, matching `NormalizedMessage::channel` and the
    /// channel config's `channel_type`.
    fn name(&self) -> &str;

    /// One-time setup (e.g. validating configured credentials). Adapters
    /// that need no setup return `Ok(())` immediately.
    async fn initialize(&self) -> Result<(), ChannelError>;

    /// Deliver an outbound message, optionally against a specific tenant's
    /// credentials.
    async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        config_override: Option<&ConfigOverride>,
    ) -> Result<(), ChannelError>;

    /// Normalize a channel-native payload that arrived outside the webhook
    /// path (e.g. an IMAP-polled email) into a `NormalizedMessage`.
    async fn receive_message(&self, payload: &Value) -> Result<NormalizedMessage, ChannelError>;

    /// Normalize an inbound webhook payload, or `None` for non-message
    /// events (status callbacks, verification pings) that are acked and
    /// dropped without entering the orchestrator.
    async fn handle_webhook(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError>;

    /// Cheap liveness probe — whether outbound sends are currently likely
    /// to succeed (credentials configured, last call did not hard-fail).
    async fn is_healthy(&self) -> bool;

    /// Graceful shutdown — stop any background polling loop.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
