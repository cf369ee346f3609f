//! Consumes normalized inbound messages and runs one orchestrator turn
//! per message, publishing the reply back onto the bus for outbound
//! dispatch: poll `consume_inbound` in a loop, process, `publish_outbound`
//! the result or a user-facing error message. Each message is processed in
//! its own spawned task so independent conversations don't serialize
//! behind each other — same-conversation turns still serialize via
//! `ContextManager`'s per-session lock inside `Orchestrator`.

use std::sync::Arc;

use hub_core::bus::{MessageBus, NormalizedMessage, OutboundMessage};
use hub_orchestrator::{FlowRouter, Orchestrator};
use hub_store::Store;
use tracing::{error, info, warn};

pub struct TurnLoop {
    bus: Arc<MessageBus>,
    store: Arc<Store>,
    router: FlowRouter,
    orchestrator: Arc<Orchestrator>,
    default_model: String,
}

impl TurnLoop {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<Store>,
        router: FlowRouter,
        orchestrator: Arc<Orchestrator>,
        default_model: String,
    ) -> Arc<Self> {
        Arc::new(TurnLoop {
            bus,
            store,
            router,
            orchestrator,
            default_model,
        })
    }

    pub async fn run(self: Arc<Self>) {
        info!("turn loop started, waiting for messages");
        loop {
            match self.bus.consume_inbound().await {
                Some(msg) => {
                    let this = self.clone();
                    tokio::spawn(async move { this.process_one(msg).await });
                }
                None => {
                    info!("inbound channel closed, turn loop exiting");
                    break;
                }
            }
        }
    }

    async fn process_one(&self, msg: NormalizedMessage) {
        let session_key = msg.session_key();

        let conversation = match self
            .store
            .get_or_create_conversation(&msg.channel, &msg.sender_id)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, session_key = %session_key, "turn loop: could not resolve conversation");
                return;
            }
        };

        let routing = match self
            .router
            .resolve(&conversation, &msg.channel, msg.channel_config_id)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, session_key = %session_key, "turn loop: flow routing failed, falling back to default behavior");
                None
            }
        };

        let outcome = self
            .orchestrator
            .process_turn(&conversation, &msg.channel, &msg.content, &self.default_model, routing.as_ref())
            .await;

        let reply = match outcome {
            Ok(result) => result.content,
            Err(e) => {
                error!(error = %e, session_key = %session_key, "turn loop: processing error");
                hub_core::HubError::from(e).user_message().to_string()
            }
        };

        let mut outbound = OutboundMessage::new(msg.channel.clone(), msg.chat_id.clone(), reply);
        if let Some(cfg_id) = msg.channel_config_id {
            outbound.metadata.insert("channel_config_id".to_string(), cfg_id.to_string());
        }

        if let Err(e) = self.bus.publish_outbound(outbound).await {
            error!(error = %e, session_key = %session_key, "turn loop: failed to publish outbound reply");
        }
    }
}
