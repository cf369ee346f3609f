//! Domain entities persisted by `hub-store` — conversations, messages,
//! flows, channel configs, knowledge bases, documents, embeddings, and
//! tool definitions/executions. See `SPEC_FULL.md` §3 for the invariants
//! these types carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// History hydration cap (messages restored into a session).
pub const MAX_HISTORY_MESSAGES: usize = 100;
/// External-context prompt injection cap, in characters.
pub const MAX_EXTERNAL_CONTEXT_CHARS: usize = 4000;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub channel_type: String,
    pub channel_user_id: String,
    pub flow_id: Option<Uuid>,
    pub status: ConversationStatus,
    #[serde(default)]
    pub external_context: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(channel_type: impl Into<String>, channel_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            channel_type: channel_type.into(),
            channel_user_id: channel_user_id.into(),
            flow_id: None,
            status: ConversationStatus::Active,
            external_context: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Merges an external-context envelope under `namespace`, last-write-wins
    /// on overlapping keys. Idempotent: applying the same envelope twice
    /// yields the same result.
    pub fn merge_external_context(&mut self, namespace: &str, envelope: Value) {
        self.external_context.insert(namespace.to_string(), envelope);
        self.last_activity = Utc::now();
    }

    /// Formats the merged external context as a prompt-injectable block,
    /// hard-capped at `MAX_EXTERNAL_CONTEXT_CHARS`.
    pub fn external_context_block(&self) -> Option<String> {
        if self.external_context.is_empty() {
            return None;
        }
        let json = serde_json::to_string_pretty(&self.external_context).ok()?;
        let capped: String = json.chars().take(MAX_EXTERNAL_CONTEXT_CHARS).collect();
        Some(format!(
            "--- External Context ---\n{}\n--- End External Context ---",
            capped
        ))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        ConversationMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            provider: None,
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            cost_usd: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingCondition {
    #[serde(default)]
    pub channel_types: Vec<String>,
    #[serde(default)]
    pub phone_regexes: Vec<String>,
    #[serde(default)]
    pub bot_usernames: Vec<String>,
    #[serde(default)]
    pub time_of_day: Option<TimeWindow>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub timezone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    pub llm_config_id: Uuid,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    pub system_prompt: String,
    pub routing: RoutingCondition,
    pub priority: i32,
    pub active: bool,
    pub greeting: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: Uuid,
    pub channel_type: String,
    /// Provider-specific credentials/addressing, e.g. WhatsApp instance id,
    /// phone-number id, Twilio account SID.
    pub credentials: HashMap<String, String>,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    Recursive,
    Fixed,
    Semantic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub name: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunking_strategy: ChunkingStrategy,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub kb_id: Uuid,
    pub content: String,
    pub source: String,
    pub status: DocumentStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kb_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub vector: Vec<f32>,
    pub token_count: i32,
}

/// A flow bound to a channel config with a rank priority — lets one
/// channel config serve several flows and lets the Flow Router break
/// ties when more than one binding matches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowChannelBinding {
    pub flow_id: Uuid,
    pub channel_config_id: Uuid,
    pub priority: i32,
}

/// A KB bound to a flow with retrieval parameters and a rank priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowKbBinding {
    pub flow_id: Uuid,
    pub kb_id: Uuid,
    pub priority: i32,
    pub similarity_threshold: f32,
    pub max_results: usize,
}

impl Default for FlowKbBinding {
    fn default() -> Self {
        FlowKbBinding {
            flow_id: Uuid::nil(),
            kb_id: Uuid::nil(),
            priority: 0,
            similarity_threshold: 0.70,
            max_results: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKindTag {
    Code,
    Email,
    Sql,
    Rest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolPermissions {
    /// Channel types allowed to invoke this tool; empty means all.
    #[serde(default)]
    pub channel_whitelist: Vec<String>,
    /// Requests allowed per `rate_limit_window_secs`; `None` means unbounded.
    #[serde(default)]
    pub rate_limit_per_window: Option<u32>,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
}

fn default_rate_limit_window() -> u64 {
    60
}

impl Default for ToolPermissions {
    fn default() -> Self {
        ToolPermissions {
            channel_whitelist: Vec::new(),
            rate_limit_per_window: None,
            rate_limit_window_secs: default_rate_limit_window(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    pub kind: ToolKindTag,
    pub description: String,
    pub parameters_schema: Value,
    pub permissions: ToolPermissions,
    pub active: bool,
}

/// Canonical tool execution status. `failed` from a legacy caller is
/// normalized to `Error` before it reaches this type — see
/// `ToolExecutionStatus::normalize`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionStatus {
    Success,
    Error,
    Timeout,
}

impl ToolExecutionStatus {
    /// Maps any legacy/loose status spelling onto the canonical set.
    /// `"failed"` (and anything else unrecognized) becomes `Error`.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "success" | "ok" => ToolExecutionStatus::Success,
            "timeout" => ToolExecutionStatus::Timeout,
            _ => ToolExecutionStatus::Error,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: Uuid,
    pub message_id: Uuid,
    pub tool_name: String,
    pub parameters: Value,
    pub result: Option<Value>,
    pub execution_time_ms: u64,
    pub status: ToolExecutionStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_external_context_merge_idempotent() {
        let mut c = Conversation::new("whatsapp", "5939...");
        let envelope = serde_json::json!({"caseId": "CASE-1", "refs": ["a"]});
        c.merge_external_context("crm", envelope.clone());
        let first = c.external_context.clone();
        c.merge_external_context("crm", envelope);
        assert_eq!(first, c.external_context);
    }

    #[test]
    fn test_external_context_block_capped() {
        let mut c = Conversation::new("whatsapp", "user");
        let big = "x".repeat(10_000);
        c.merge_external_context("ns", serde_json::json!({ "blob": big }));
        let block = c.external_context_block().unwrap();
        assert!(block.len() <= MAX_EXTERNAL_CONTEXT_CHARS + 64);
    }

    #[test]
    fn test_external_context_block_empty_when_no_context() {
        let c = Conversation::new("telegram", "user");
        assert!(c.external_context_block().is_none());
    }

    #[test]
    fn test_tool_execution_status_normalizes_failed_to_error() {
        assert_eq!(
            ToolExecutionStatus::normalize("failed"),
            ToolExecutionStatus::Error
        );
        assert_eq!(
            ToolExecutionStatus::normalize("success"),
            ToolExecutionStatus::Success
        );
        assert_eq!(
            ToolExecutionStatus::normalize("timeout"),
            ToolExecutionStatus::Timeout
        );
    }

    #[test]
    fn test_flow_kb_binding_defaults() {
        let binding = FlowKbBinding::default();
        assert_eq!(binding.similarity_threshold, 0.70);
        assert_eq!(binding.max_results, 5);
    }
}
