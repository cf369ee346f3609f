//! Shared application state handed to every axum handler. Assembly lives
//! in `main.rs`; this just names the bag of `Arc`s every route closes over.

use std::sync::Arc;

use hub_channels::{EmailChannel, TelegramChannel, WhatsAppChannel};
use hub_core::bus::MessageBus;
use hub_core::config::schema::{AuthConfig, WebchatConfig};
use hub_queue::QueueBroker;
use hub_store::Store;
use hub_ws::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<MessageBus>,
    pub store: Arc<Store>,
    pub queue: Arc<QueueBroker>,
    pub whatsapp: Arc<WhatsAppChannel>,
    pub telegram: Arc<TelegramChannel>,
    pub email: Arc<EmailChannel>,
    pub auth: AuthConfig,
    pub webchat: WebchatConfig,
    pub ws_registry: Arc<ConnectionRegistry>,
    pub redis_configured: bool,
}
