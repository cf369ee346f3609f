//! Telegram and generic `:channel` webhook ingress. WhatsApp's GET/POST
//! handlers live in `hub_channels::ingress` (that provider needs the
//! verify-token handshake and three wire shapes); Telegram only ever POSTs
//! a single JSON update shape, so its handler is the same ack-then-spawn
//! state machine inlined here rather than generalized into the channels
//! crate for one provider.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

use hub_channels::Channel;

use crate::state::AppState;

pub async fn telegram_webhook(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    handle_update(&state, &payload).await
}

/// `POST /webhooks/:channel` — the "identical contract" generic route.
/// WhatsApp and Telegram both speak JSON POST bodies so the same
/// dispatch works for either name; email has no webhook transport since
/// it arrives via IMAP polling.
pub async fn generic_webhook(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    match channel.as_str() {
        "whatsapp" => {
            let kind = hub_channels::detect_provider(&payload);
            match state.whatsapp.normalize_webhook(kind, &payload).await {
                Ok(Some(msg)) => ack_and_dispatch(&state, msg).await,
                Ok(None) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
                Err(e) => {
                    warn!(error = %e, "generic webhook: whatsapp normalize failed");
                    (StatusCode::OK, Json(json!({"status": "error", "detail": e.to_string()}))).into_response()
                }
            }
        }
        "telegram" => handle_update(&state, &payload).await,
        other => {
            debug!(channel = other, "generic webhook: unknown channel, acking without processing");
            (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
        }
    }
}

async fn handle_update(state: &AppState, payload: &Value) -> Response {
    match state.telegram.handle_webhook(payload).await {
        Ok(Some(msg)) => ack_and_dispatch(state, msg).await,
        Ok(None) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(e) => {
            warn!(error = %e, "telegram webhook: normalize failed");
            (StatusCode::OK, Json(json!({"status": "error", "detail": e.to_string()}))).into_response()
        }
    }
}

/// Shared dedup-then-ack-then-spawn tail, matching
/// `hub_channels::ingress::webhook_handler`'s discipline: the ack is built
/// before the bus publish is spawned so the spawned task can never hold up
/// the response.
async fn ack_and_dispatch(state: &AppState, normalized: hub_core::bus::NormalizedMessage) -> Response {
    if let Some(provider_id) = &normalized.provider_message_id {
        match state
            .store
            .get_or_create_conversation(&normalized.channel, &normalized.sender_id)
            .await
        {
            Ok(conv) => match state.store.has_provider_message_id(conv.id, provider_id).await {
                Ok(true) => {
                    debug!(provider_id = %provider_id, "webhook: duplicate message, acking");
                    return (StatusCode::OK, Json(json!({"status": "ok", "duplicate": true}))).into_response();
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "webhook: dedup lookup failed, processing anyway"),
            },
            Err(e) => warn!(error = %e, "webhook: could not resolve conversation for dedup check"),
        }
    }

    let ack = (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response();
    let bus = state.bus.clone();
    tokio::spawn(async move {
        if let Err(e) = bus.publish_inbound(normalized).await {
            warn!(error = %e, "webhook: failed to publish normalized message to bus");
        }
    });
    ack
}
