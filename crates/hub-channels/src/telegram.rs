//! Telegram adapter — webhook-driven. Updates arrive over
//! `POST /webhooks/telegram` rather than through a long-polling client, so
//! this talks to the Bot HTTP API directly with `reqwest`. The allow-list
//! check is the same "id|username", empty = allow all" shape used by the
//! other channel adapters.

use std::time::Duration;

use hub_core::bus::NormalizedMessage;
use hub_core::config::schema::TelegramConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::traits::{Channel, ConfigOverride};

const TELEGRAM_MAX_LEN: usize = 4096;

pub struct TelegramChannel {
    config: TelegramConfig,
    allowed_users: Vec<String>,
    http: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, allowed_users: Vec<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        TelegramChannel {
            config,
            allowed_users,
            http,
        }
    }

    /// Sender id format is "user_id|username"; empty allow-list allows
    /// everyone, otherwise either part may match.
    fn is_allowed(&self, sender_id: &str) -> bool {
        if self.allowed_users.is_empty() {
            return true;
        }
        if self.allowed_users.iter().any(|u| u == sender_id) {
            return true;
        }
        sender_id
            .split('|')
            .any(|part| !part.is_empty() && self.allowed_users.iter().any(|u| u == part))
    }

    fn api_base(&self) -> Option<String> {
        self.config
            .bot_token
            .as_deref()
            .map(|token| format!("https://api.telegram.org/bot{token}"))
    }

    pub fn parse_update(&self, payload: &Value) -> Option<NormalizedMessage> {
        let message = payload.get("message").or_else(|| payload.get("edited_message"))?;

        let from = message.get("from")?;
        let user_id = from.get("id")?.as_i64()?.to_string();
        let username = from.get("username").and_then(Value::as_str).unwrap_or("");
        let sender_id = format!("{user_id}|{username}");

        if !self.is_allowed(&sender_id) {
            debug!(sender_id = %sender_id, "telegram: sender not in allow-list, dropping");
            return None;
        }

        let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();

        let body = message.get("text").and_then(Value::as_str);
        let caption = message.get("caption").and_then(Value::as_str);
        let content = body
            .filter(|b| !b.is_empty())
            .or(caption.filter(|c| !c.is_empty()))
            .unwrap_or("")
            .to_string();

        let message_id = message.get("message_id").and_then(Value::as_i64).map(|id| id.to_string());

        let mut msg = NormalizedMessage::new("telegram", user_id, chat_id, content);
        msg.provider_message_id = message_id;
        Some(msg)
    }
}

#[async_trait::async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        if self.config.bot_token.is_none() {
            warn!("telegram: no bot token configured");
        }
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &str,
        _config_override: Option<&ConfigOverride>,
    ) -> Result<(), ChannelError> {
        let base = self
            .api_base()
            .ok_or_else(|| ChannelError::NotConfigured("telegram".into()))?;

        for chunk in split_message(message, TELEGRAM_MAX_LEN) {
            let resp = self
                .http
                .post(format!("{base}/sendMessage"))
                .json(&serde_json::json!({"chat_id": chat_id, "text": chunk}))
                .send()
                .await
                .map_err(|e| ChannelError::RequestFailed("telegram".into(), e.to_string()))?;

            if !resp.status().is_success() {
                return Err(ChannelError::RequestFailed("telegram".into(), resp.status().to_string()));
            }
        }
        Ok(())
    }

    async fn receive_message(&self, payload: &Value) -> Result<NormalizedMessage, ChannelError> {
        self.parse_update(payload).ok_or(ChannelError::UnknownPayload)
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        Ok(self.parse_update(payload))
    }

    async fn is_healthy(&self) -> bool {
        self.config.bot_token.is_some()
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Splits text on line boundaries so no chunk exceeds `max_len`; falls back
/// to a hard split if a single line is itself too long.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if line.chars().count() > max_len {
                for hard in line.as_bytes().chunks(max_len) {
                    chunks.push(String::from_utf8_lossy(hard).to_string());
                }
                continue;
            }
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: Vec<String>) -> TelegramChannel {
        TelegramChannel::new(
            TelegramConfig {
                bot_token: Some("test-token".into()),
            },
            allowed,
        )
    }

    #[test]
    fn test_is_allowed_empty_list_allows_all() {
        let ch = channel(vec![]);
        assert!(ch.is_allowed("123|alice"));
    }

    #[test]
    fn test_is_allowed_matches_id() {
        let ch = channel(vec!["123".into()]);
        assert!(ch.is_allowed("123|alice"));
    }

    #[test]
    fn test_is_allowed_matches_username() {
        let ch = channel(vec!["alice".into()]);
        assert!(ch.is_allowed("123|alice"));
    }

    #[test]
    fn test_is_allowed_rejects_unknown() {
        let ch = channel(vec!["bob".into()]);
        assert!(!ch.is_allowed("123|alice"));
    }

    #[test]
    fn test_parse_update_prefers_text_over_caption() {
        let ch = channel(vec![]);
        let payload = serde_json::json!({
            "message": {
                "message_id": 42,
                "from": {"id": 1, "username": "alice"},
                "chat": {"id": 1},
                "text": "hello",
                "caption": "ignored"
            }
        });
        let msg = ch.parse_update(&payload).unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.chat_id, "1");
    }

    #[test]
    fn test_parse_update_drops_disallowed_sender() {
        let ch = channel(vec!["bob".into()]);
        let payload = serde_json::json!({
            "message": {
                "message_id": 1,
                "from": {"id": 1, "username": "alice"},
                "chat": {"id": 1},
                "text": "hi"
            }
        });
        assert!(ch.parse_update(&payload).is_none());
    }

    #[test]
    fn test_split_message_short_text_unchanged() {
        assert_eq!(split_message("hello", 4096), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_message_splits_long_text() {
        let long = "a".repeat(5000);
        let chunks = split_message(&long, 4096);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4096));
    }
}
