use std::time::Duration;

use chrono::{DateTime, Utc};
use hub_core::bus::OutboundMessage;
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(3);
pub const DEFAULT_KEEP_COMPLETED: usize = 100;
pub const DEFAULT_KEEP_FAILED: usize = 500;

/// Per-enqueue overrides of the queue's retry policy.
#[derive(Clone, Debug)]
pub struct EnqueueOptions {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        EnqueueOptions {
            attempts: DEFAULT_ATTEMPTS,
            initial_backoff: INITIAL_BACKOFF,
        }
    }
}

/// One unit of outbound work: "send `payload` via `job_name`'s handler,
/// retrying up to `max_attempts` times with exponential backoff."
#[derive(Clone, Debug)]
pub struct Job {
    pub id: Uuid,
    pub queue_name: String,
    pub job_name: String,
    pub payload: Value,
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(queue_name: impl Into<String>, job_name: impl Into<String>, payload: Value, options: &EnqueueOptions) -> Self {
        Job {
            id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            job_name: job_name.into(),
            payload,
            attempt: 0,
            max_attempts: options.attempts,
            backoff: options.initial_backoff,
            enqueued_at: Utc::now(),
        }
    }

    /// Builds a send job from an orchestrator-produced outbound message.
    /// The payload mirrors `OutboundMessage`'s fields since that type
    /// carries no `Serialize` impl of its own.
    pub fn for_outbound_message(job_name: impl Into<String>, msg: &OutboundMessage, options: &EnqueueOptions) -> Self {
        let payload = serde_json::json!({
            "channel": msg.channel,
            "chatId": msg.chat_id,
            "content": msg.content,
            "replyTo": msg.reply_to,
            "media": msg.media,
            "metadata": msg.metadata,
        });
        Job::new(msg.channel.clone(), job_name, payload, options)
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Doubles the backoff for the next retry attempt (exponential).
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self.backoff *= 2;
        self
    }
}

/// A terminal record kept for observability after a job leaves the
/// in-flight worker pool. Bounded per queue by retention caps.
#[derive(Clone, Debug)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub job_name: String,
    pub attempts_made: u32,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_attempt_doubles_backoff() {
        let options = EnqueueOptions::default();
        let job = Job::new("outbound", "whatsapp.send", serde_json::json!({}), &options);
        let retried = job.next_attempt();
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.backoff, INITIAL_BACKOFF * 2);
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let options = EnqueueOptions { attempts: 2, initial_backoff: INITIAL_BACKOFF };
        let job = Job::new("outbound", "job", serde_json::json!({}), &options).next_attempt().next_attempt();
        assert!(job.exhausted());
    }

    #[test]
    fn test_for_outbound_message_carries_channel_and_content() {
        let msg = OutboundMessage::new("telegram", "chat_1", "hello");
        let job = Job::for_outbound_message("telegram.send", &msg, &EnqueueOptions::default());
        assert_eq!(job.queue_name, "telegram");
        assert_eq!(job.payload["content"], "hello");
        assert_eq!(job.payload["chatId"], "chat_1");
    }
}
