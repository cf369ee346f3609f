//! Bearer token issuance/verification for the webchat widget. The token is
//! a short-lived JWT carrying `user_id`/`website_id` (the channel config
//! id)/optional `flow_id`, minted by `POST /api/v1/webchat/auth` and
//! verified here on the WebSocket handshake.

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebchatClaims {
    pub user_id: String,
    pub website_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<Uuid>,
    /// Issue timestamp (unix seconds), carried alongside `exp` so a
    /// consumer can tell a freshly issued token from one near expiry.
    pub timestamp: i64,
    pub exp: i64,
}

pub fn issue_token(
    secret: &str,
    user_id: &str,
    website_id: Uuid,
    flow_id: Option<Uuid>,
    ttl_secs: i64,
) -> Result<String, WsError> {
    let now = Utc::now();
    let claims = WebchatClaims {
        user_id: user_id.to_string(),
        website_id,
        flow_id,
        timestamp: now.timestamp(),
        exp: (now + ChronoDuration::seconds(ttl_secs)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| WsError::InvalidToken(e.to_string()))
}

pub fn verify_token(secret: &str, token: &str) -> Result<WebchatClaims, WsError> {
    decode::<WebchatClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| WsError::InvalidToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let website_id = Uuid::new_v4();
        let token = issue_token("secret", "user-1", website_id, None, 3600).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.website_id, website_id);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = issue_token("secret", "user-1", Uuid::new_v4(), None, 3600).unwrap();
        assert!(verify_token("wrong-secret", &token).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let token = issue_token("secret", "user-1", Uuid::new_v4(), None, -10).unwrap();
        assert!(verify_token("secret", &token).is_err());
    }
}
