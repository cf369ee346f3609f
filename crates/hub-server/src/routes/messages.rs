//! `POST /api/v1/messages/send` — direct API ingress, bypassing any
//! channel-specific webhook shape. Bearer-authenticated against the
//! configured JWT signing secret used as a static shared key for this
//! route (no separate API-key table exists yet; see DESIGN.md).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use hub_core::bus::NormalizedMessage;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    channel_type: String,
    user_id: String,
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    if !authorized(&headers, &state.auth.jwt_secret) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response();
    }

    let mut msg = NormalizedMessage::new(body.channel_type.clone(), body.user_id.clone(), body.user_id.clone(), body.content);
    if let Some(Value::Object(map)) = body.metadata {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                msg.metadata.insert(k, s.to_string());
            }
        }
    }

    if let Err(e) = state.bus.publish_inbound(msg).await {
        warn!(error = %e, "messages.send: failed to publish to bus");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "message bus unavailable"}))).into_response();
    }

    (StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))).into_response()
}

fn authorized(headers: &HeaderMap, expected_secret: &str) -> bool {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    token == expected_secret
}
