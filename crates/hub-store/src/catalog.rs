//! Read-mostly admin-owned catalog: flows, channel configs, knowledge
//! bases, documents, and flow/KB bindings. The admin CRUD surface that
//! writes these tables is out of scope (see `SPEC_FULL.md` §6); this
//! module only implements the read paths the core pipeline needs.

use crate::{Store, StoreError};
use hub_core::domain::{
    ChannelConfig, ChunkingStrategy, Document, DocumentStatus, Flow, FlowChannelBinding,
    FlowKbBinding, KnowledgeBase, RoutingCondition,
};
use sqlx::Row;
use uuid::Uuid;

impl Store {
    /// Active flows bound to a channel config, ranked by binding priority
    /// ascending — the tie-break the Flow Router applies when more than
    /// one flow is reachable from the same channel.
    pub async fn flows_for_channel_config(
        &self,
        channel_config_id: Uuid,
    ) -> Result<Vec<(FlowChannelBinding, Flow)>, StoreError> {
        let rows = sqlx::query(
            "SELECT b.flow_id, b.channel_config_id, b.priority AS binding_priority, \
             f.id, f.name, f.llm_config_id, f.enabled_tools, f.system_prompt, f.routing, \
             f.priority, f.active, f.greeting \
             FROM flow_channel_bindings b JOIN flows f ON f.id = b.flow_id \
             WHERE b.channel_config_id = $1 AND f.active = true ORDER BY b.priority ASC",
        )
        .bind(channel_config_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r: sqlx::postgres::PgRow| {
                let binding = FlowChannelBinding {
                    flow_id: r.get("flow_id"),
                    channel_config_id: r.get("channel_config_id"),
                    priority: r.get("binding_priority"),
                };
                (binding, row_to_flow(r))
            })
            .collect())
    }

    pub async fn active_flows_by_priority(&self) -> Result<Vec<Flow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, llm_config_id, enabled_tools, system_prompt, routing, \
             priority, active, greeting FROM flows WHERE active = true ORDER BY priority ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_flow).collect())
    }

    pub async fn get_flow(&self, id: Uuid) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, llm_config_id, enabled_tools, system_prompt, routing, \
             priority, active, greeting FROM flows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_flow))
    }

    pub async fn get_channel_config(&self, id: Uuid) -> Result<Option<ChannelConfig>, StoreError> {
        let row = sqlx::query("SELECT id, channel_type, credentials, active FROM channel_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r: sqlx::postgres::PgRow| ChannelConfig {
            id: r.get("id"),
            channel_type: r.get("channel_type"),
            credentials: serde_json::from_value(r.get("credentials")).unwrap_or_default(),
            active: r.get("active"),
        }))
    }

    /// KBs bound to a flow, ordered by binding priority ascending — the
    /// order the RAG engine merges results in.
    pub async fn flow_kb_bindings(&self, flow_id: Uuid) -> Result<Vec<FlowKbBinding>, StoreError> {
        let rows = sqlx::query(
            "SELECT flow_id, kb_id, priority, similarity_threshold, max_results \
             FROM flow_kb_bindings WHERE flow_id = $1 ORDER BY priority ASC",
        )
        .bind(flow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r: sqlx::postgres::PgRow| FlowKbBinding {
                flow_id: r.get("flow_id"),
                kb_id: r.get("kb_id"),
                priority: r.get("priority"),
                similarity_threshold: r.get("similarity_threshold"),
                max_results: r.get::<i32, _>("max_results") as usize,
            })
            .collect())
    }

    pub async fn get_knowledge_base(&self, id: Uuid) -> Result<Option<KnowledgeBase>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, embedding_model, embedding_dimension, chunk_size, chunk_overlap, \
             chunking_strategy, active FROM knowledge_bases WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r: sqlx::postgres::PgRow| {
            let strategy: String = r.get("chunking_strategy");
            KnowledgeBase {
                id: r.get("id"),
                name: r.get("name"),
                embedding_model: r.get("embedding_model"),
                embedding_dimension: r.get::<i32, _>("embedding_dimension") as usize,
                chunk_size: r.get::<i32, _>("chunk_size") as usize,
                chunk_overlap: r.get::<i32, _>("chunk_overlap") as usize,
                chunking_strategy: match strategy.as_str() {
                    "fixed" => ChunkingStrategy::Fixed,
                    "semantic" => ChunkingStrategy::Semantic,
                    _ => ChunkingStrategy::Recursive,
                },
                active: r.get("active"),
            }
        }))
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT id, kb_id, content, source, status FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r: sqlx::postgres::PgRow| {
            let status: String = r.get("status");
            Document {
                id: r.get("id"),
                kb_id: r.get("kb_id"),
                content: r.get("content"),
                source: r.get("source"),
                status: match status.as_str() {
                    "processing" => DocumentStatus::Processing,
                    "completed" => DocumentStatus::Completed,
                    "failed" => DocumentStatus::Failed,
                    _ => DocumentStatus::Pending,
                },
            }
        }))
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, kb_id, content, source, status) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(doc.id)
        .bind(doc.kb_id)
        .bind(&doc.content)
        .bind(&doc.source)
        .bind(document_status_str(doc.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET status = $1 WHERE id = $2")
            .bind(document_status_str(status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn document_status_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Processing => "processing",
        DocumentStatus::Completed => "completed",
        DocumentStatus::Failed => "failed",
    }
}

fn row_to_flow(row: sqlx::postgres::PgRow) -> Flow {
    Flow {
        id: row.get("id"),
        name: row.get("name"),
        llm_config_id: row.get("llm_config_id"),
        enabled_tools: serde_json::from_value(row.get("enabled_tools")).unwrap_or_default(),
        system_prompt: row.get("system_prompt"),
        routing: serde_json::from_value::<RoutingCondition>(row.get("routing")).unwrap_or(RoutingCondition {
            channel_types: Vec::new(),
            phone_regexes: Vec::new(),
            bot_usernames: Vec::new(),
            time_of_day: None,
        }),
        priority: row.get("priority"),
        active: row.get("active"),
        greeting: row.get("greeting"),
    }
}
