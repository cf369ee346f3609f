//! Context Manager — deterministic session identity and conversation
//! history hydration. Keeps an in-memory cache of up to N recent messages
//! per session, backed by Postgres as the source of truth; a
//! `tokio::sync::Mutex` per session key serializes concurrent turns against
//! the same conversation.

use std::collections::HashMap;
use std::sync::Arc;

use hub_core::domain::{Conversation, ConversationMessage};
use hub_store::{Store, StoreError};
use tokio::sync::Mutex;

/// In-memory view of a conversation's recent history, installed on
/// first reference and kept current as the turn progresses.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub history: Vec<ConversationMessage>,
}

/// Per-session-key lock plus cached history. The lock is held for the
/// duration of a turn so concurrent turns for the same conversation are
/// processed in arrival order, never interleaved.
struct SessionSlot {
    lock: Mutex<()>,
    cache: Mutex<Option<SessionContext>>,
}

pub struct ContextManager {
    store: Arc<Store>,
    max_history_messages: i64,
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl ContextManager {
    pub fn new(store: Arc<Store>, max_history_messages: usize) -> Self {
        ContextManager {
            store,
            max_history_messages: max_history_messages as i64,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// `session_id = f(channel_type, user_id, conversation_id)` — stable
    /// across processes since it's a pure function of the three inputs,
    /// not a random id.
    pub fn session_key(channel_type: &str, user_id: &str, conversation_id: uuid::Uuid) -> String {
        format!("{channel_type}:{user_id}:{conversation_id}")
    }

    async fn slot_for(&self, session_key: &str) -> Arc<SessionSlot> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_key.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    lock: Mutex::new(()),
                    cache: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Acquire the per-session turn lock, hydrating history from the
    /// Store on first reference, and run `f` with the live context. The
    /// lock is held for the whole closure, serializing concurrent turns
    /// for this session.
    pub async fn with_session<F, Fut, T>(
        &self,
        conversation: &Conversation,
        channel_type: &str,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: std::future::Future<Output = (T, SessionContext)>,
    {
        let session_key = Self::session_key(channel_type, &conversation.channel_user_id, conversation.id);
        let slot = self.slot_for(&session_key).await;
        let _turn_guard = slot.lock.lock().await;

        let mut cached = slot.cache.lock().await;
        let ctx = match cached.take() {
            Some(ctx) => ctx,
            None => self.hydrate(conversation.id).await?,
        };

        let (result, updated) = f(ctx).await;
        *cached = Some(updated);
        Ok(result)
    }

    async fn hydrate(&self, conversation_id: uuid::Uuid) -> Result<SessionContext, StoreError> {
        let history = self
            .store
            .get_history(conversation_id, self.max_history_messages)
            .await?;
        Ok(SessionContext { history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_is_deterministic() {
        let id = uuid::Uuid::new_v4();
        let a = ContextManager::session_key("whatsapp", "user_1", id);
        let b = ContextManager::session_key("whatsapp", "user_1", id);
        assert_eq!(a, b);
    }

    #[test]
    fn test_session_key_differs_by_channel() {
        let id = uuid::Uuid::new_v4();
        let a = ContextManager::session_key("whatsapp", "user_1", id);
        let b = ContextManager::session_key("telegram", "user_1", id);
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_context_default_empty() {
        let ctx = SessionContext::default();
        assert!(ctx.history.is_empty());
    }
}
