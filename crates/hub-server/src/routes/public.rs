//! Public, unauthenticated widget/agent lookups. CORS is left wide open on
//! these two routes (the router's `CorsLayer` only restricts the webchat
//! WebSocket origin check); the response bodies are deliberately narrow —
//! no credentials, no system prompt, no tool list — since anything served
//! here is visible to an arbitrary website visitor.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /api/widgets/{widgetKey}/config` — `widgetKey` is the webchat
/// channel config's id. Returns what the embed script needs to open a
/// socket: the allowed origins it should run on and a default greeting
/// resolved through the config's bound flow, the same precedence
/// `hub_ws::session::resolve_greeting` uses.
pub async fn widget_config(State(state): State<AppState>, Path(widget_key): Path<String>) -> Response {
    let Ok(widget_id) = Uuid::parse_str(&widget_key) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown widget"}))).into_response();
    };

    let config = match state.store.get_channel_config(widget_id).await {
        Ok(Some(c)) if c.active && c.channel_type == "webchat" => c,
        Ok(_) => return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown widget"}))).into_response(),
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response();
        }
    };

    let greeting = match state.store.flows_for_channel_config(config.id).await {
        Ok(bindings) => bindings.into_iter().find_map(|(_, flow)| flow.greeting),
        Err(_) => None,
    };

    (
        StatusCode::OK,
        Json(json!({
            "widgetKey": widget_key,
            "allowedOrigins": state.webchat.allowed_origins,
            "greeting": greeting,
        })),
    )
        .into_response()
}

/// `GET /api/agents/{agentId}/public` — `agentId` is a flow id. Only the
/// name and greeting are public; `system_prompt`/`enabled_tools`/
/// `llm_config_id` stay server-side.
pub async fn agent_public(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    let Ok(flow_id) = Uuid::parse_str(&agent_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown agent"}))).into_response();
    };

    match state.store.get_flow(flow_id).await {
        Ok(Some(flow)) if flow.active => (
            StatusCode::OK,
            Json(json!({"id": flow.id, "name": flow.name, "greeting": flow.greeting})),
        )
            .into_response(),
        Ok(_) => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown agent"}))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response(),
    }
}
