//! Message persistence — append-only, with the history-hydration query
//! the Context Manager uses (last N, ascending) and the dedup lookup the
//! ingress state machine uses (by provider message id).

use crate::{Store, StoreError};
use hub_core::domain::{ConversationMessage, MessageRole};
use serde_json::Value;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

impl Store {
    pub async fn append_message(&self, msg: &ConversationMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, provider, model, \
             prompt_tokens, completion_tokens, cost_usd, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(msg.id)
        .bind(msg.conversation_id)
        .bind(role_str(msg.role))
        .bind(&msg.content)
        .bind(&msg.provider)
        .bind(&msg.model)
        .bind(msg.prompt_tokens)
        .bind(msg.completion_tokens)
        .bind(msg.cost_usd)
        .bind(serde_json::to_value(&msg.metadata).unwrap_or_default())
        .bind(msg.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Restores up to `limit` most recent messages for a conversation,
    /// ascending by timestamp (oldest first) — the shape the Context
    /// Manager installs into a fresh session.
    pub async fn get_history(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, provider, model, prompt_tokens, \
             completion_tokens, cost_usd, metadata, created_at FROM ( \
                SELECT * FROM messages WHERE conversation_id = $1 \
                ORDER BY created_at DESC LIMIT $2 \
             ) AS recent ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Dedup check: does a user message with this provider-assigned id
    /// already exist in this conversation?
    pub async fn has_provider_message_id(
        &self,
        conversation_id: Uuid,
        provider_message_id: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM messages WHERE conversation_id = $1 \
             AND metadata->>'providerMessageId' = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

fn row_to_message(row: sqlx::postgres::PgRow) -> ConversationMessage {
    let role: String = row.get("role");
    let metadata: Value = row.get("metadata");
    ConversationMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: match role.as_str() {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        },
        content: row.get("content"),
        provider: row.get("provider"),
        model: row.get("model"),
        prompt_tokens: row.get("prompt_tokens"),
        completion_tokens: row.get("completion_tokens"),
        cost_usd: row.get("cost_usd"),
        metadata: serde_json::from_value::<HashMap<String, Value>>(metadata).unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}
