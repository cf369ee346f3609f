//! Conversation persistence. Implements the §3 uniqueness invariants:
//! at most one conversation per (channel_type, channel_user_id, flow_id)
//! when flow_id is set, and "most recent" lookup when it isn't.

use crate::{Store, StoreError};
use chrono::Utc;
use hub_core::domain::{Conversation, ConversationStatus};
use serde_json::Value;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

impl Store {
    /// Finds the most recent conversation for (channel_type, channel_user_id)
    /// with no flow pinned, or one pinned to `flow_id` if given.
    pub async fn find_conversation(
        &self,
        channel_type: &str,
        channel_user_id: &str,
        flow_id: Option<Uuid>,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = match flow_id {
            Some(fid) => {
                sqlx::query(
                    "SELECT id, channel_type, channel_user_id, flow_id, status, \
                     external_context, created_at, last_activity FROM conversations \
                     WHERE channel_type = $1 AND channel_user_id = $2 AND flow_id = $3",
                )
                .bind(channel_type)
                .bind(channel_user_id)
                .bind(fid)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, channel_type, channel_user_id, flow_id, status, \
                     external_context, created_at, last_activity FROM conversations \
                     WHERE channel_type = $1 AND channel_user_id = $2 \
                     ORDER BY last_activity DESC LIMIT 1",
                )
                .bind(channel_type)
                .bind(channel_user_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.map(row_to_conversation))
    }

    pub async fn get_or_create_conversation(
        &self,
        channel_type: &str,
        channel_user_id: &str,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self.find_conversation(channel_type, channel_user_id, None).await? {
            return Ok(existing);
        }

        let conv = Conversation::new(channel_type, channel_user_id);
        sqlx::query(
            "INSERT INTO conversations (id, channel_type, channel_user_id, flow_id, status, \
             external_context, created_at, last_activity) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(conv.id)
        .bind(&conv.channel_type)
        .bind(&conv.channel_user_id)
        .bind(conv.flow_id)
        .bind(status_str(conv.status))
        .bind(serde_json::to_value(&conv.external_context).unwrap_or_default())
        .bind(conv.created_at)
        .bind(conv.last_activity)
        .execute(&self.pool)
        .await?;

        Ok(conv)
    }

    pub async fn pin_flow(&self, conversation_id: Uuid, flow_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET flow_id = $1, last_activity = $2 WHERE id = $3")
            .bind(flow_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }

    /// Merges an external-context envelope. Idempotent at the JSON level:
    /// the same envelope applied twice yields the same stored value.
    pub async fn upsert_external_context(
        &self,
        conversation_id: Uuid,
        namespace: &str,
        envelope: Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE conversations SET external_context = jsonb_set(coalesce(external_context, '{}'::jsonb), $1, $2, true), \
             last_activity = $3 WHERE id = $4",
        )
        .bind(vec![namespace.to_string()])
        .bind(envelope)
        .bind(Utc::now())
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_last_activity(&self, conversation_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET last_activity = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn status_str(status: ConversationStatus) -> &'static str {
    match status {
        ConversationStatus::Active => "active",
        ConversationStatus::Closed => "closed",
        ConversationStatus::Archived => "archived",
    }
}

fn row_to_conversation(row: sqlx::postgres::PgRow) -> Conversation {
    let status: String = row.get("status");
    let ctx: Value = row.get("external_context");
    Conversation {
        id: row.get("id"),
        channel_type: row.get("channel_type"),
        channel_user_id: row.get("channel_user_id"),
        flow_id: row.get("flow_id"),
        status: match status.as_str() {
            "closed" => ConversationStatus::Closed,
            "archived" => ConversationStatus::Archived,
            _ => ConversationStatus::Active,
        },
        external_context: serde_json::from_value::<HashMap<String, Value>>(ctx).unwrap_or_default(),
        created_at: row.get("created_at"),
        last_activity: row.get("last_activity"),
    }
}
