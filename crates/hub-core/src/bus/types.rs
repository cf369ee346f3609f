//! Bus event types — messages flowing between channel adapters and the
//! orchestrator.

use crate::llm::MediaAttachment;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A message normalized by a channel adapter's `receiveMessage`/
/// `handleWebhook`, ready for the ingress dedup check and the
/// orchestrator turn.
#[derive(Clone, Debug)]
pub struct NormalizedMessage {
    /// Channel name (e.g. "whatsapp", "telegram", "email", "webchat").
    pub channel: String,
    /// Sender identifier within the channel, already normalized (see
    /// `hub_core::utils::normalize_whatsapp_user_id` for WhatsApp).
    pub sender_id: String,
    /// Chat/conversation identifier as seen by the channel.
    pub chat_id: String,
    /// The channel config this message arrived through, when resolvable.
    pub channel_config_id: Option<Uuid>,
    /// Text content of the message.
    pub content: String,
    /// Provider-assigned message id, used for dedup.
    pub provider_message_id: Option<String>,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Attached media (photos, voice, documents).
    pub media: Vec<MediaAttachment>,
    /// Channel-specific metadata (e.g. raw webhook fields).
    pub metadata: HashMap<String, String>,
}

impl NormalizedMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        NormalizedMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            channel_config_id: None,
            content: content.into(),
            provider_message_id: None,
            timestamp: Utc::now(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Session key combining channel and chat_id (e.g. "telegram:123456").
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// An outbound message from the orchestrator to a channel adapter, routed
/// through `hub-queue`.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    pub reply_to: Option<String>,
    pub media: Vec<MediaAttachment>,
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_message_creation() {
        let msg = NormalizedMessage::new("whatsapp", "593991234567", "chat_99", "hola");
        assert_eq!(msg.channel, "whatsapp");
        assert_eq!(msg.sender_id, "593991234567");
        assert!(msg.media.is_empty());
        assert!(msg.channel_config_id.is_none());
    }

    #[test]
    fn test_session_key() {
        let msg = NormalizedMessage::new("telegram", "user_1", "channel_abc", "test");
        assert_eq!(msg.session_key(), "telegram:channel_abc");
    }

    #[test]
    fn test_outbound_message_creation() {
        let msg = OutboundMessage::new("telegram", "chat_99", "Here's your answer!");
        assert_eq!(msg.content, "Here's your answer!");
        assert!(msg.reply_to.is_none());
    }
}
