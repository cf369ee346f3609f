pub mod auth;
pub mod error;
pub mod session;

pub use auth::{issue_token, verify_token, WebchatClaims};
pub use error::WsError;
pub use session::{ws_handler, ConnectionRegistry, ServerPush, WsState};
