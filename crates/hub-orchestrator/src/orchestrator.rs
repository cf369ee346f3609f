//! AI Orchestrator — executes one conversational turn end-to-end: resolve
//! the flow for this turn, call the `hub-llm` `Gateway`, dispatch any tool
//! calls through the `hub-tools` registry (recording each execution and
//! its permission decision), and loop until the model returns a final
//! reply or the turn's tool-call budget is exhausted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use hub_core::domain::{Conversation, ConversationMessage, ToolExecution};
use hub_core::llm::{Message, ToolDefinition};
use hub_llm::Gateway;
use hub_rag::RagEngine;
use hub_store::Store;
use hub_tools::ToolRegistry;
use tracing::info;
use uuid::Uuid;

use crate::context_manager::{ContextManager, SessionContext};
use crate::error::OrchestratorError;
use crate::flow_router::ResolvedRouting;

/// Everything the caller needs to dispatch the reply and log analytics.
#[derive(Debug)]
pub struct ProcessingResult {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub tool_executions: Vec<ToolExecution>,
    pub processing_time_ms: u64,
    pub finish_reason: String,
}

pub struct Orchestrator {
    store: Arc<Store>,
    context: ContextManager,
    gateway: Arc<Gateway>,
    rag: Arc<RagEngine>,
    tools: Arc<ToolRegistry>,
    max_tool_executions: u32,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<Gateway>,
        rag: Arc<RagEngine>,
        tools: Arc<ToolRegistry>,
        max_history_messages: usize,
        max_tool_executions: u32,
    ) -> Self {
        Orchestrator {
            context: ContextManager::new(store.clone(), max_history_messages),
            store,
            gateway,
            rag,
            tools,
            max_tool_executions,
        }
    }

    /// Runs one turn. `routing` is `None` when the Flow Router found no
    /// match, in which case a bare default-model completion is attempted
    /// with no system prompt, no RAG, and no tools.
    pub async fn process_turn(
        &self,
        conversation: &Conversation,
        channel_type: &str,
        user_content: &str,
        model: &str,
        routing: Option<&ResolvedRouting>,
    ) -> Result<ProcessingResult, OrchestratorError> {
        let start = Instant::now();

        let result = self
            .context
            .with_session(conversation, channel_type, |ctx| async move {
                let outcome = self.run_turn(conversation, user_content, model, routing, ctx.clone()).await;
                match outcome {
                    Ok((result, updated_history)) => (
                        Ok(result),
                        SessionContext {
                            history: updated_history,
                        },
                    ),
                    Err(e) => (Err(e), ctx),
                }
            })
            .await
            .map_err(OrchestratorError::from)?;

        result.map(|mut r| {
            r.processing_time_ms = start.elapsed().as_millis() as u64;
            r
        })
    }

    async fn run_turn(
        &self,
        conversation: &Conversation,
        user_content: &str,
        model: &str,
        routing: Option<&ResolvedRouting>,
        ctx: SessionContext,
    ) -> Result<(ProcessingResult, Vec<ConversationMessage>), OrchestratorError> {
        let system_prompt = self.compose_system_prompt(conversation, user_content, routing).await;

        let mut messages = Vec::new();
        if let Some(prompt) = &system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        for m in &ctx.history {
            messages.push(history_to_wire(m));
        }
        messages.push(Message::user(user_content));

        let tool_defs = self.resolve_tool_definitions(routing);

        let req_config = hub_llm::LlmRequestConfig::default();
        let mut tool_executions = Vec::new();
        let mut iterations = 0u32;

        let user_message = ConversationMessage::user(conversation.id, user_content);
        self.store.append_message(&user_message).await?;

        let final_response = loop {
            if iterations > self.max_tool_executions {
                return Err(OrchestratorError::ToolLoopExceeded(self.max_tool_executions));
            }

            let response = self
                .gateway
                .complete(&messages, Some(tool_defs.as_slice()), model, &req_config)
                .await
                .map_err(|_| OrchestratorError::NoProvidersAvailable)?;

            if !response.has_tool_calls() {
                break response;
            }

            messages.push(Message::assistant_tool_calls(response.tool_calls.clone()));

            for call in &response.tool_calls {
                let params: HashMap<String, serde_json::Value> =
                    serde_json::from_str(&call.function.arguments).unwrap_or_default();

                info!(tool = %call.function.name, "dispatching tool call");
                let outcome = self
                    .tools
                    .dispatch(user_message.id, &call.function.name, conversation.channel_type.as_str(), params)
                    .await;

                self.store.insert_tool_execution(&outcome.execution).await.ok();
                tool_executions.push(outcome.execution);

                messages.push(Message::tool_result(call.id.clone(), outcome.result_text));
            }

            iterations += 1;
        };

        let content = final_response
            .content
            .clone()
            .unwrap_or_else(|| "I've completed processing but have no response to give.".into());

        let mut assistant_message = ConversationMessage::assistant(conversation.id, &content);
        if let Some(usage) = &final_response.usage {
            assistant_message.prompt_tokens = Some(usage.prompt_tokens as i32);
            assistant_message.completion_tokens = Some(usage.completion_tokens as i32);
        }
        self.store.append_message(&assistant_message).await?;
        self.store.touch_last_activity(conversation.id).await?;

        let mut updated_history = ctx.history;
        updated_history.push(user_message);
        updated_history.push(assistant_message);
        if updated_history.len() > hub_core::domain::MAX_HISTORY_MESSAGES {
            let overflow = updated_history.len() - hub_core::domain::MAX_HISTORY_MESSAGES;
            updated_history.drain(0..overflow);
        }

        let (prompt_tokens, completion_tokens) = final_response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        info!(
            conversation_id = %conversation.id,
            prompt_tokens,
            completion_tokens,
            tool_calls = tool_executions.len(),
            "message_processed"
        );

        Ok((
            ProcessingResult {
                content,
                prompt_tokens,
                completion_tokens,
                cost_usd: 0.0,
                tool_executions,
                processing_time_ms: 0,
                finish_reason: final_response
                    .finish_reason
                    .unwrap_or_else(|| hub_core::llm::FINISH_STOP.to_string()),
            },
            updated_history,
        ))
    }

    async fn compose_system_prompt(
        &self,
        conversation: &Conversation,
        user_content: &str,
        routing: Option<&ResolvedRouting>,
    ) -> Option<String> {
        let flow = routing?.flow.clone();
        let mut prompt = flow.system_prompt.clone();

        let rag_context = self.rag.retrieve(flow.id, user_content, None).await;
        if !rag_context.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&rag_context.block);
        }

        if let Some(block) = conversation.external_context_block() {
            prompt.push_str("\n\n");
            prompt.push_str(&block);
        }

        Some(prompt)
    }

    fn resolve_tool_definitions(&self, routing: Option<&ResolvedRouting>) -> Vec<ToolDefinition> {
        match routing {
            Some(r) if !r.flow.enabled_tools.is_empty() => self
                .tools
                .get_definitions()
                .into_iter()
                .filter(|d| r.flow.enabled_tools.iter().any(|n| n == &d.function.name))
                .collect(),
            Some(_) => Vec::new(),
            None => Vec::new(),
        }
    }
}

fn history_to_wire(msg: &ConversationMessage) -> Message {
    use hub_core::domain::MessageRole;
    match msg.role {
        MessageRole::User => Message::user(msg.content.clone()),
        MessageRole::Assistant => Message::assistant(msg.content.clone()),
        MessageRole::System => Message::system(msg.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_to_wire_roundtrips_role() {
        let conv_id = Uuid::new_v4();
        let m = ConversationMessage::user(conv_id, "hi");
        match history_to_wire(&m) {
            Message::User { .. } => {}
            _ => panic!("expected user message"),
        }
    }
}
