//! WebSocket session state machine for the webchat widget. Runs a
//! `tokio::select!` loop over the inbound socket read and a shutdown
//! signal, the same shape used elsewhere in this codebase for a
//! long-lived bidirectional connection, with this side acting as the
//! server accepting a connection rather than a client dialing out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use hub_core::bus::{MessageBus, NormalizedMessage};
use hub_core::config::schema::WebchatConfig;
use hub_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::verify_token;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Auth { token: String },
    Message { content: String, #[serde(default)] message_id: Option<String> },
    Ping,
}

/// A frame pushed to a connected client. `ServerPush::Message` is what the
/// orchestrator's reply gets wrapped in when delivered to this socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPush {
    Connected { id: String },
    AuthSuccess { user_id: String },
    Message { content: String, metadata: HashMap<String, String>, timestamp: DateTime<Utc> },
    MessageReceived { message_id: Option<String> },
    Ping,
    Pong,
    Error { reason: String },
}

#[derive(Clone)]
pub struct WsState {
    pub config: WebchatConfig,
    pub jwt_secret: String,
    pub bus: Arc<MessageBus>,
    pub store: Arc<Store>,
    pub registry: Arc<ConnectionRegistry>,
    pub greeting_guard: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

/// Maps a live connection's session key to a sender the outbound dispatch
/// path uses to push assistant replies back into the right open socket.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, mpsc::Sender<ServerPush>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry { connections: Mutex::new(HashMap::new()) }
    }

    pub async fn register(&self, session_key: String, sender: mpsc::Sender<ServerPush>) {
        self.connections.lock().await.insert(session_key, sender);
    }

    pub async fn unregister(&self, session_key: &str) {
        self.connections.lock().await.remove(session_key);
    }

    pub async fn send_to(&self, session_key: &str, push: ServerPush) -> bool {
        let connections = self.connections.lock().await;
        match connections.get(session_key) {
            Some(sender) => sender.send(push).await.is_ok(),
            None => false,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: WsState) {
    let temp_id = Uuid::new_v4().to_string();
    if send_frame(&mut socket, &ServerPush::Connected { id: temp_id.clone() }).await.is_err() {
        return;
    }

    let claims = match wait_for_auth(&mut socket, &state).await {
        Ok(claims) => claims,
        Err(reason) => {
            debug!(reason = %reason, "webchat: authentication failed");
            let _ = socket.send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                code: 1008,
                reason: reason.into(),
            }))).await;
            return;
        }
    };

    if send_frame(&mut socket, &ServerPush::AuthSuccess { user_id: claims.user_id.clone() }).await.is_err() {
        return;
    }

    let session_key = format!("webchat:{}:{}", claims.website_id, claims.user_id);
    maybe_send_greeting(&mut socket, &state, &claims, &session_key).await;

    let (tx, mut rx) = mpsc::channel::<ServerPush>(32);
    state.registry.register(session_key.clone(), tx).await;

    let mut ping_interval = tokio::time::interval(Duration::from_secs(state.config.ping_interval_secs));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_frame(&mut socket, &state, &claims, &session_key, &text).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        log_close(frame.as_ref().map(|f| f.code));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "webchat: socket read error");
                        break;
                    }
                    None => break,
                }
            }
            push = rx.recv() => {
                match push {
                    Some(push) => {
                        if send_frame(&mut socket, &push).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if send_frame(&mut socket, &ServerPush::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.unregister(&session_key).await;
}

async fn wait_for_auth(socket: &mut WebSocket, state: &WsState) -> Result<crate::auth::WebchatClaims, String> {
    let timeout = Duration::from_secs(state.config.auth_timeout_secs);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Err("Authentication timeout".to_string());
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Auth { token }) => {
                                return verify_token(&state.jwt_secret, &token)
                                    .map_err(|e| e.to_string());
                            }
                            _ => continue,
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err("connection closed before auth".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.to_string()),
                }
            }
        }
    }
}

async fn maybe_send_greeting(socket: &mut WebSocket, state: &WsState, claims: &crate::auth::WebchatClaims, session_key: &str) {
    let has_history = match state.store.find_conversation("webchat", session_key, None).await {
        Ok(Some(conv)) => match state.store.get_history(conv.id, 1).await {
            Ok(history) => !history.is_empty(),
            Err(e) => {
                warn!(error = %e, "webchat: failed to check prior history for greeting");
                return;
            }
        },
        Ok(None) => false,
        Err(e) => {
            warn!(error = %e, "webchat: failed to look up conversation for greeting");
            return;
        }
    };
    if has_history {
        return;
    }

    {
        let mut guard = state.greeting_guard.lock().await;
        if let Some(last) = guard.get(session_key) {
            if Utc::now().signed_duration_since(*last).num_seconds() < state.config.greeting_window_secs {
                return;
            }
        }
        guard.insert(session_key.to_string(), Utc::now());
    }

    let greeting = resolve_greeting(state, claims).await;
    if let Some(text) = greeting {
        let _ = send_frame(socket, &ServerPush::Message {
            content: text,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }).await;
    }
}

async fn resolve_greeting(state: &WsState, claims: &crate::auth::WebchatClaims) -> Option<String> {
    if let Some(flow_id) = claims.flow_id {
        if let Ok(Some(flow)) = state.store.get_flow(flow_id).await {
            return flow.greeting;
        }
    }
    let bindings = state.store.flows_for_channel_config(claims.website_id).await.ok()?;
    bindings.into_iter().find_map(|(_, flow)| flow.greeting)
}

async fn handle_client_frame(socket: &mut WebSocket, state: &WsState, claims: &crate::auth::WebchatClaims, session_key: &str, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(f) => f,
        Err(e) => {
            let _ = send_frame(socket, &ServerPush::Error { reason: format!("malformed frame: {e}") }).await;
            return;
        }
    };

    match frame {
        ClientFrame::Ping => {
            let _ = send_frame(socket, &ServerPush::Pong).await;
        }
        ClientFrame::Auth { .. } => {}
        ClientFrame::Message { content, message_id } => {
            let mut msg = NormalizedMessage::new("webchat", claims.user_id.clone(), session_key.to_string(), content);
            msg.channel_config_id = Some(claims.website_id);
            msg.metadata.insert("session_key".to_string(), session_key.to_string());
            if let Some(flow_id) = claims.flow_id {
                msg.metadata.insert("flow_id".to_string(), flow_id.to_string());
            }

            if let Err(e) = state.bus.publish_inbound(msg).await {
                warn!(error = %e, "webchat: failed to publish inbound message");
            }
            let _ = send_frame(socket, &ServerPush::MessageReceived { message_id }).await;
        }
    }
}

async fn send_frame(socket: &mut WebSocket, push: &ServerPush) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(push).unwrap_or_else(|_| json!({"type": "error"}).to_string());
    socket.send(WsMessage::Text(payload.into())).await
}

/// Close-code classification: 1000/1001 are normal closes, 1006 is
/// treated as "user closed tab" (debug), 1008 expected ("Authentication
/// timeout", info), the rest are real errors.
fn log_close(code: Option<u16>) {
    match code {
        Some(1000) | Some(1001) => debug!(code, "webchat: normal close"),
        Some(1006) => debug!("webchat: connection dropped (user closed tab)"),
        Some(1008) => info!("webchat: authentication timeout"),
        Some(other) => warn!(code = other, "webchat: abnormal close"),
        None => debug!("webchat: close frame with no code"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_send_to_unknown_session_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to("nobody", ServerPush::Ping).await);
    }

    #[tokio::test]
    async fn test_registry_register_then_send() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register("webchat:a:b".to_string(), tx).await;
        assert!(registry.send_to("webchat:a:b", ServerPush::Pong).await);
        assert!(matches!(rx.recv().await, Some(ServerPush::Pong)));
    }

    #[tokio::test]
    async fn test_registry_unregister_drops_target() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.register("session".to_string(), tx).await;
        registry.unregister("session").await;
        assert!(!registry.send_to("session", ServerPush::Ping).await);
    }

    #[test]
    fn test_client_frame_auth_deserializes() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Auth { token } if token == "abc"));
    }

    #[test]
    fn test_client_frame_message_deserializes_without_message_id() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"message","content":"hi"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Message { content, message_id } if content == "hi" && message_id.is_none()));
    }
}
