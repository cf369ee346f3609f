//! Webhook ingress state machine — classify, identify, dedup, ack, spawn.
//! The ack-then-process discipline here verifies the request signature
//! before touching the body, responds fast, and does the real work in a
//! spawned task after the response is already on the wire.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hub_core::bus::MessageBus;
use hub_store::Store;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::whatsapp::WhatsAppChannel;

/// Pure classification over a webhook payload's shape. Payloads may be
/// wrapped in an outer `body` field; callers unwrap once before calling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Dialog360,
    Ultramsg,
    Twilio,
    Unknown,
}

/// Unwraps a single layer of `{"body": {...}}` wrapping some providers use,
/// then classifies the payload shape.
pub fn detect_provider(payload: &Value) -> ProviderKind {
    let payload = payload.get("body").unwrap_or(payload);

    if payload.get("object").and_then(Value::as_str) == Some("whatsapp_business_account") {
        return ProviderKind::Dialog360;
    }
    if payload.get("instanceId").is_some() {
        return ProviderKind::Ultramsg;
    }
    if payload.get("MessageSid").is_some() && payload.get("AccountSid").is_some() {
        return ProviderKind::Twilio;
    }
    ProviderKind::Unknown
}

#[derive(Clone)]
pub struct IngressState {
    pub bus: Arc<MessageBus>,
    pub store: Arc<Store>,
    pub whatsapp: Arc<WhatsAppChannel>,
    pub webhook_verify_token: String,
}

#[derive(serde::Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET handler for the subscribe+verify_token handshake 360dialog/Meta
/// Cloud API webhooks require before POSTing real traffic.
pub async fn verify_handler(
    State(state): State<IngressState>,
    Query(q): Query<VerifyQuery>,
) -> Response {
    if q.mode.as_deref() == Some("subscribe") && q.verify_token.as_deref() == Some(state.webhook_verify_token.as_str()) {
        return (StatusCode::OK, q.challenge.unwrap_or_default()).into_response();
    }
    StatusCode::FORBIDDEN.into_response()
}

/// POST handler implementing the RECV -> CLASSIFY -> ... state machine.
/// ACK is written before the async turn is spawned — the spawned task
/// must never touch this response.
pub async fn webhook_handler(State(state): State<IngressState>, Json(payload): Json<Value>) -> Response {
    let kind = detect_provider(&payload);
    let unwrapped = payload.get("body").cloned().unwrap_or(payload);

    if is_status_event(kind, &unwrapped) {
        debug!(?kind, "ingress: status event acked and dropped");
        return (StatusCode::OK, Json(json!({"status": "ok"}))).into_response();
    }

    let normalized = match state.whatsapp.normalize_webhook(kind, &unwrapped).await {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            debug!(?kind, "ingress: payload produced no message, acking");
            return (StatusCode::OK, Json(json!({"status": "ok"}))).into_response();
        }
        Err(e) => {
            warn!(error = %e, ?kind, "ingress: failed to normalize webhook payload");
            return (StatusCode::OK, Json(json!({"status": "error", "detail": e.to_string()}))).into_response();
        }
    };

    if let Some(provider_id) = &normalized.provider_message_id {
        match state
            .store
            .get_or_create_conversation(&normalized.channel, &normalized.sender_id)
            .await
        {
            Ok(conv) => match state.store.has_provider_message_id(conv.id, provider_id).await {
                Ok(true) => {
                    debug!(provider_id = %provider_id, "ingress: duplicate message, acking");
                    return (StatusCode::OK, Json(json!({"status": "ok", "duplicate": true}))).into_response();
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "ingress: dedup lookup failed, processing anyway");
                }
            },
            Err(e) => {
                warn!(error = %e, "ingress: could not resolve conversation for dedup check");
            }
        }
    }

    let ack = (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response();

    let bus = state.bus.clone();
    tokio::spawn(async move {
        if let Err(e) = bus.publish_inbound(normalized).await {
            warn!(error = %e, "ingress: failed to publish normalized message to bus");
        }
    });

    ack
}

fn is_status_event(kind: ProviderKind, payload: &Value) -> bool {
    match kind {
        ProviderKind::Dialog360 => payload
            .pointer("/entry/0/changes/0/value/statuses")
            .is_some(),
        ProviderKind::Ultramsg => payload.get("event_type").and_then(Value::as_str) == Some("message_ack"),
        ProviderKind::Twilio => payload.get("MessageStatus").is_some() && payload.get("Body").is_none(),
        ProviderKind::Unknown => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dialog360() {
        let payload = json!({"object": "whatsapp_business_account"});
        assert_eq!(detect_provider(&payload), ProviderKind::Dialog360);
    }

    #[test]
    fn test_detect_ultramsg() {
        let payload = json!({"instanceId": "instance123"});
        assert_eq!(detect_provider(&payload), ProviderKind::Ultramsg);
    }

    #[test]
    fn test_detect_twilio() {
        let payload = json!({"MessageSid": "SM123", "AccountSid": "AC123"});
        assert_eq!(detect_provider(&payload), ProviderKind::Twilio);
    }

    #[test]
    fn test_detect_unknown() {
        let payload = json!({"foo": "bar"});
        assert_eq!(detect_provider(&payload), ProviderKind::Unknown);
    }

    #[test]
    fn test_detect_unwraps_body_layer() {
        let payload = json!({"body": {"instanceId": "x"}});
        assert_eq!(detect_provider(&payload), ProviderKind::Ultramsg);
    }

    #[test]
    fn test_twilio_status_event_detected() {
        let payload = json!({"MessageStatus": "delivered"});
        assert!(is_status_event(ProviderKind::Twilio, &payload));
    }

    #[test]
    fn test_twilio_message_event_not_status() {
        let payload = json!({"MessageSid": "SM1", "AccountSid": "AC1", "Body": "hi"});
        assert!(!is_status_event(ProviderKind::Twilio, &payload));
    }
}
