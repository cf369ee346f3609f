//! Tool Registry — a name-keyed `HashMap<String, Arc<dyn Tool>>` with
//! sorted `tool_names()`/`get_definitions()` (the LLM always gets a
//! `String` back), extended with declarative `ToolKind` variants,
//! permission checks, rate limiting, and execution-record bookkeeping.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hub_core::domain::{ToolExecution, ToolExecutionStatus, ToolPermissions};
use hub_core::llm::ToolDefinition;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::specs::{EmailToolSpec, RestToolSpec, SqlToolSpec};
use crate::traits::Tool;

/// A registered tool's implementation. `Code` wraps a Rust handler
/// trait object; the other three are data-only and interpreted by the
/// dispatcher.
pub enum ToolKind {
    Code(Arc<dyn Tool>),
    Email(EmailToolSpec),
    Sql(SqlToolSpec),
    Rest(RestToolSpec),
}

impl ToolKind {
    fn name(&self) -> &str {
        match self {
            ToolKind::Code(t) => t.name(),
            ToolKind::Email(s) => &s.name,
            ToolKind::Sql(s) => &s.name,
            ToolKind::Rest(s) => &s.name,
        }
    }

    fn description(&self) -> &str {
        match self {
            ToolKind::Code(t) => t.description(),
            ToolKind::Email(s) => &s.description,
            ToolKind::Sql(s) => &s.description,
            ToolKind::Rest(s) => &s.description,
        }
    }

    fn parameters(&self) -> Value {
        match self {
            ToolKind::Code(t) => t.parameters(),
            ToolKind::Email(s) => s.parameters_schema(),
            ToolKind::Sql(s) => s.parameters_schema(),
            ToolKind::Rest(s) => s.parameters_schema(),
        }
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }

    async fn run(&self, params: HashMap<String, Value>) -> Result<String, ToolError> {
        match self {
            ToolKind::Code(t) => t
                .execute(params)
                .await
                .map_err(|e| ToolError::HandlerFailed(t.name().to_string(), e.to_string())),
            ToolKind::Email(s) => s.execute(&params).await,
            ToolKind::Sql(s) => s.execute(&params).await,
            ToolKind::Rest(s) => s.execute(&params).await,
        }
    }
}

struct ToolEntry {
    kind: ToolKind,
    permissions: ToolPermissions,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ToolEntry {
    fn new(kind: ToolKind, permissions: ToolPermissions) -> Self {
        let limiter = permissions.rate_limit_per_window.and_then(|limit| {
            let limit = NonZeroU32::new(limit)?;
            let period_nanos =
                (permissions.rate_limit_window_secs.max(1) as u64 * 1_000_000_000) / limit.get() as u64;
            let quota = Quota::with_period(Duration::from_nanos(period_nanos.max(1)))?
                .allow_burst(limit);
            Some(RateLimiter::direct(quota))
        });
        ToolEntry {
            kind,
            permissions,
            limiter,
        }
    }

    fn check_permission(&self, channel: &str) -> Result<(), ToolError> {
        if self.permissions.channel_whitelist.is_empty() {
            return Ok(());
        }
        if self
            .permissions
            .channel_whitelist
            .iter()
            .any(|c| c == channel)
        {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied(
                self.kind.name().to_string(),
                channel.to_string(),
            ))
        }
    }

    fn check_rate_limit(&self) -> Result<(), ToolError> {
        match &self.limiter {
            Some(limiter) => limiter
                .check()
                .map_err(|_| ToolError::RateLimited(self.kind.name().to_string())),
            None => Ok(()),
        }
    }
}

/// Outcome of a dispatch: the string handed back to the LLM plus the
/// execution record persisted for the turn.
pub struct DispatchOutcome {
    pub result_text: String,
    pub execution: ToolExecution,
}

pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: ToolKind, permissions: ToolPermissions) {
        let name = kind.name().to_string();
        info!(tool = %name, "registered tool");
        self.tools.insert(name, ToolEntry::new(kind, permissions));
    }

    pub fn register_default(&mut self, kind: ToolKind) {
        self.register(kind, ToolPermissions::default());
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|e| e.kind.to_definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name, enforcing permissions and rate limits and
    /// producing the execution record the turn must persist. Mirrors the
    /// teacher's convention that the LLM always gets a `String` back,
    /// even on failure — the difference here is the accompanying record.
    pub async fn dispatch(
        &self,
        message_id: Uuid,
        name: &str,
        channel: &str,
        params: HashMap<String, Value>,
    ) -> DispatchOutcome {
        let parameters = serde_json::to_value(&params).unwrap_or(Value::Null);
        let start = Instant::now();

        let entry = match self.tools.get(name) {
            Some(e) => e,
            None => {
                warn!(tool = name, "tool not found");
                let msg = format!("Tool '{name}' not found");
                return DispatchOutcome {
                    result_text: format!("Error: {msg}"),
                    execution: build_execution(message_id, name, parameters, start, Err(msg)),
                };
            }
        };

        if let Err(e) = entry.check_permission(channel) {
            warn!(tool = name, channel, "tool denied by permissions");
            return DispatchOutcome {
                result_text: format!("Error: {e}"),
                execution: build_execution(message_id, name, parameters, start, Err(e.to_string())),
            };
        }

        if let Err(e) = entry.check_rate_limit() {
            warn!(tool = name, "tool rate limited");
            return DispatchOutcome {
                result_text: format!("Error: {e}"),
                execution: build_execution(message_id, name, parameters, start, Err(e.to_string())),
            };
        }

        match entry.kind.run(params).await {
            Ok(result) => DispatchOutcome {
                result_text: result.clone(),
                execution: build_execution(message_id, name, parameters, start, Ok(result)),
            },
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                let status = if matches!(e, ToolError::Timeout(_, _)) {
                    ToolExecutionStatus::Timeout
                } else {
                    ToolExecutionStatus::Error
                };
                DispatchOutcome {
                    result_text: format!("Error executing {name}: {e}"),
                    execution: build_execution_with_status(
                        message_id,
                        name,
                        parameters,
                        start,
                        Err(e.to_string()),
                        status,
                    ),
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_execution(
    message_id: Uuid,
    name: &str,
    parameters: Value,
    start: Instant,
    outcome: Result<String, String>,
) -> ToolExecution {
    let status = if outcome.is_ok() {
        ToolExecutionStatus::Success
    } else {
        ToolExecutionStatus::Error
    };
    build_execution_with_status(message_id, name, parameters, start, outcome, status)
}

fn build_execution_with_status(
    message_id: Uuid,
    name: &str,
    parameters: Value,
    start: Instant,
    outcome: Result<String, String>,
    status: ToolExecutionStatus,
) -> ToolExecution {
    let execution_time_ms = start.elapsed().as_millis() as u64;
    let (result, error) = match outcome {
        Ok(r) => (Some(Value::String(r)), None),
        Err(e) => (None, Some(e)),
    };
    ToolExecution {
        id: Uuid::new_v4(),
        message_id,
        tool_name: name.to_string(),
        parameters,
        result,
        execution_time_ms,
        status,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("(empty)");
            Ok(format!("Echo: {text}"))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
            anyhow::bail!("intentional failure")
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register_default(ToolKind::Code(Arc::new(EchoTool)));
        assert!(reg.has("echo"));
        assert!(!reg.has("nope"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_tool_names_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register_default(ToolKind::Code(Arc::new(FailTool)));
        reg.register_default(ToolKind::Code(Arc::new(EchoTool)));
        assert_eq!(reg.tool_names(), vec!["echo", "fail"]);
    }

    #[test]
    fn test_get_definitions_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register_default(ToolKind::Code(Arc::new(FailTool)));
        reg.register_default(ToolKind::Code(Arc::new(EchoTool)));
        let defs = reg.get_definitions();
        assert_eq!(defs[0].function.name, "echo");
        assert_eq!(defs[1].function.name, "fail");
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let mut reg = ToolRegistry::new();
        reg.register_default(ToolKind::Code(Arc::new(EchoTool)));
        let mut params = HashMap::new();
        params.insert("text".into(), json!("hi"));
        let outcome = reg.dispatch(Uuid::new_v4(), "echo", "whatsapp", params).await;
        assert_eq!(outcome.result_text, "Echo: hi");
        assert_eq!(outcome.execution.status, ToolExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_dispatch_not_found() {
        let reg = ToolRegistry::new();
        let outcome = reg.dispatch(Uuid::new_v4(), "missing", "telegram", HashMap::new()).await;
        assert!(outcome.result_text.starts_with("Error: Tool 'missing' not found"));
        assert_eq!(outcome.execution.status, ToolExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_dispatch_handler_failure_recorded() {
        let mut reg = ToolRegistry::new();
        reg.register_default(ToolKind::Code(Arc::new(FailTool)));
        let outcome = reg.dispatch(Uuid::new_v4(), "fail", "whatsapp", HashMap::new()).await;
        assert!(outcome.result_text.starts_with("Error executing fail:"));
        assert_eq!(outcome.execution.status, ToolExecutionStatus::Error);
        assert!(outcome.execution.error.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_permission_denied() {
        let mut reg = ToolRegistry::new();
        let perms = ToolPermissions {
            channel_whitelist: vec!["telegram".into()],
            rate_limit_per_window: None,
            rate_limit_window_secs: 60,
        };
        reg.register(ToolKind::Code(Arc::new(EchoTool)), perms);
        let outcome = reg.dispatch(Uuid::new_v4(), "echo", "whatsapp", HashMap::new()).await;
        assert!(outcome.result_text.contains("not permitted"));
        assert_eq!(outcome.execution.status, ToolExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_dispatch_allowed_channel_passes() {
        let mut reg = ToolRegistry::new();
        let perms = ToolPermissions {
            channel_whitelist: vec!["whatsapp".into()],
            rate_limit_per_window: None,
            rate_limit_window_secs: 60,
        };
        reg.register(ToolKind::Code(Arc::new(EchoTool)), perms);
        let mut params = HashMap::new();
        params.insert("text".into(), json!("ok"));
        let outcome = reg.dispatch(Uuid::new_v4(), "echo", "whatsapp", params).await;
        assert_eq!(outcome.result_text, "Echo: ok");
    }

    #[tokio::test]
    async fn test_dispatch_rate_limited_after_burst() {
        let mut reg = ToolRegistry::new();
        let perms = ToolPermissions {
            channel_whitelist: Vec::new(),
            rate_limit_per_window: Some(1),
            rate_limit_window_secs: 60,
        };
        reg.register(ToolKind::Code(Arc::new(EchoTool)), perms);
        let mut params = HashMap::new();
        params.insert("text".into(), json!("a"));
        let first = reg.dispatch(Uuid::new_v4(), "echo", "whatsapp", params.clone()).await;
        assert_eq!(first.result_text, "Echo: a");
        let second = reg.dispatch(Uuid::new_v4(), "echo", "whatsapp", params).await;
        assert!(second.result_text.contains("rate limit exceeded"));
    }

    #[test]
    fn test_default_empty() {
        let reg = ToolRegistry::default();
        assert!(reg.is_empty());
    }
}
