//! Outbound dispatch: drains `MessageBus::consume_outbound` and routes each
//! reply either straight into a live WebSocket connection (webchat) or onto
//! the named `hub-queue` queue for its channel, where a `ChannelJobHandler`
//! eventually calls the adapter's `send_message`. Queue failure is logged
//! and does not panic the dispatch loop — per `SPEC_FULL.md`'s "queue
//! failure is fatal to delivery, not to the turn" rule, the turn has
//! already completed by the time this loop runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hub_channels::{Channel, ConfigOverride};
use hub_core::bus::MessageBus;
use hub_queue::{EnqueueOptions, Job, JobHandler, QueueBroker};
use hub_ws::{ConnectionRegistry, ServerPush};
use tracing::{error, warn};
use uuid::Uuid;

/// Dispatches a queued job to one channel adapter's `send_message`.
pub struct ChannelJobHandler {
    channel: Arc<dyn Channel>,
}

impl ChannelJobHandler {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        ChannelJobHandler { channel }
    }
}

#[async_trait]
impl JobHandler for ChannelJobHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let chat_id = job
            .payload
            .get("chatId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("job payload missing chatId"))?;
        let content = job
            .payload
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("job payload missing content"))?;

        let channel_config_id = job
            .payload
            .get("metadata")
            .and_then(|m| m.get("channel_config_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        let override_ = channel_config_id.map(|id| ConfigOverride { channel_config_id: Some(id) });
        self.channel
            .send_message(chat_id, content, override_.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }
}

/// Runs until the bus's outbound channel is closed. Webchat replies are
/// pushed directly to the registered socket, bypassing the queue — there
/// is no provider round trip to retry, the socket is either open or it
/// isn't.
pub async fn run_outbound_dispatch(bus: Arc<MessageBus>, queue: Arc<QueueBroker>, ws_registry: Arc<ConnectionRegistry>) {
    loop {
        match bus.consume_outbound().await {
            Some(msg) => {
                if msg.channel == "webchat" {
                    let push = ServerPush::Message {
                        content: msg.content,
                        metadata: msg.metadata,
                        timestamp: Utc::now(),
                    };
                    if !ws_registry.send_to(&msg.chat_id, push).await {
                        warn!(chat_id = %msg.chat_id, "dispatch: webchat socket not connected, reply dropped");
                    }
                    continue;
                }

                let options = EnqueueOptions::default();
                let job_name = format!("{}.send", msg.channel);
                let built = Job::for_outbound_message(job_name.clone(), &msg, &options);
                if let Err(e) = queue
                    .enqueue(&msg.channel, job_name, built.payload, options)
                    .await
                {
                    error!(error = %e, channel = %msg.channel, "CRITICAL: outbound queue unavailable, reply dropped");
                }
            }
            None => {
                warn!("dispatch: outbound channel closed, dispatch loop exiting");
                break;
            }
        }
    }
}
