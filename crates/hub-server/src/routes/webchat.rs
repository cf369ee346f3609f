//! `POST /api/v1/webchat/auth` — issues the short-lived bearer token the
//! widget presents on the WebSocket handshake (`hub_ws::auth::verify_token`).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use hub_ws::issue_token;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebchatAuthRequest {
    user_id: String,
    website_id: Uuid,
    #[serde(default)]
    flow_id: Option<Uuid>,
}

pub async fn issue_webchat_token(State(state): State<AppState>, Json(body): Json<WebchatAuthRequest>) -> Response {
    match issue_token(
        &state.auth.jwt_secret,
        &body.user_id,
        body.website_id,
        body.flow_id,
        state.auth.webchat_token_ttl_secs,
    ) {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({"token": token, "expiresIn": state.auth.webchat_token_ttl_secs})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
