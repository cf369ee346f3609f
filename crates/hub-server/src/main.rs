//! `hub-server` — the HTTP + WebSocket entrypoint. Wires config, storage,
//! the LLM gateway, RAG, tools, the orchestrator, every channel adapter,
//! the outbound queue broker, and the webchat WebSocket layer into one
//! axum `Router`, then runs until `Ctrl+C`.
//!
//! Startup order: load config -> build the shared dependencies
//! bottom-up -> construct each channel -> race the server against a
//! shutdown signal.

mod dispatch;
mod routes;
mod state;
mod turn_loop;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hub_channels::{Channel, EmailChannel, IngressState, TelegramChannel, WhatsAppChannel};
use hub_core::bus::MessageBus;
use hub_core::config::load_config;
use hub_llm::Gateway;
use hub_orchestrator::{FlowRouter, Orchestrator};
use hub_queue::QueueBroker;
use hub_rag::RagEngine;
use hub_store::Store;
use hub_tools::ToolRegistry;
use hub_ws::{ConnectionRegistry, WsState};

use crate::dispatch::{run_outbound_dispatch, ChannelJobHandler};
use crate::state::AppState;
use crate::turn_loop::TurnLoop;

const BUS_BUFFER: usize = 256;
const QUEUE_WORKERS: usize = 4;
const QUEUE_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "hub-server", version, about = "Conversational hub HTTP + WebSocket server")]
struct Cli {
    /// Path to the JSON config file. Defaults to the platform config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    let store = Arc::new(
        Store::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to database")?,
    );

    let bus = Arc::new(MessageBus::new(BUS_BUFFER));

    let gateway = Arc::new(Gateway::new(config.providers.clone(), config.gateway.clone()));
    // No embedding-provider section exists in config yet (see DESIGN.md);
    // RAG retrieval degrades to an empty context until one is wired in.
    let rag = Arc::new(RagEngine::new(store.clone(), HashMap::new()));
    let tools = Arc::new(ToolRegistry::new());

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        gateway.clone(),
        rag.clone(),
        tools.clone(),
        config.gateway.max_history_messages,
        config.gateway.max_tool_executions,
    ));
    let router = FlowRouter::new(store.clone());
    let turn_loop = TurnLoop::new(bus.clone(), store.clone(), router, orchestrator, config.gateway.default_model.clone());
    tokio::spawn(turn_loop.run());

    let whatsapp = Arc::new(WhatsAppChannel::new(config.whatsapp.clone()));
    let telegram = Arc::new(TelegramChannel::new(config.telegram.clone(), Vec::new()));
    let email = Arc::new(EmailChannel::new(config.email.clone(), Vec::new()));

    for (name, result) in [
        ("whatsapp", whatsapp.initialize().await),
        ("telegram", telegram.initialize().await),
        ("email", email.initialize().await),
    ] {
        if let Err(e) = result {
            warn!(channel = name, error = %e, "channel initialization reported an issue, continuing anyway");
        }
    }

    let queue = Arc::new(QueueBroker::new());
    queue
        .register_queue("whatsapp", QUEUE_WORKERS, QUEUE_BUFFER, Arc::new(ChannelJobHandler::new(whatsapp.clone())))
        .await;
    queue
        .register_queue("telegram", QUEUE_WORKERS, QUEUE_BUFFER, Arc::new(ChannelJobHandler::new(telegram.clone())))
        .await;
    queue
        .register_queue("email", QUEUE_WORKERS, QUEUE_BUFFER, Arc::new(ChannelJobHandler::new(email.clone())))
        .await;

    let ws_registry = Arc::new(ConnectionRegistry::new());
    tokio::spawn(run_outbound_dispatch(bus.clone(), queue.clone(), ws_registry.clone()));
    tokio::spawn(run_email_poll_loop(email.clone(), bus.clone()));

    let ingress_state = IngressState {
        bus: bus.clone(),
        store: store.clone(),
        whatsapp: whatsapp.clone(),
        webhook_verify_token: config.whatsapp.webhook_verify_token.clone(),
    };

    let ws_state = WsState {
        config: config.webchat.clone(),
        jwt_secret: config.auth.jwt_secret.clone(),
        bus: bus.clone(),
        store: store.clone(),
        registry: ws_registry.clone(),
        greeting_guard: Arc::new(Mutex::new(HashMap::new())),
    };

    let app_state = AppState {
        bus,
        store,
        queue,
        whatsapp,
        telegram,
        email,
        auth: config.auth.clone(),
        webchat: config.webchat.clone(),
        ws_registry,
        redis_configured: config.redis.url.is_some(),
    };

    let cors = if app_state.webchat.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(
                app_state
                    .webchat
                    .allowed_origins
                    .iter()
                    .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
    };

    let api_routes = Router::new()
        .route("/webhooks/telegram", post(routes::webhooks::telegram_webhook))
        .route("/webhooks/:channel", post(routes::webhooks::generic_webhook))
        .route("/api/v1/messages/send", post(routes::messages::send_message))
        .route("/api/v1/webchat/auth", post(routes::webchat::issue_webchat_token))
        .route("/api/widgets/:widget_key/config", get(routes::public::widget_config))
        .route("/api/agents/:agent_id/public", get(routes::public::agent_public))
        .route("/health", get(routes::health::health))
        .with_state(app_state);

    let whatsapp_routes = Router::new()
        .route("/webhooks/whatsapp", get(hub_channels::verify_handler).post(hub_channels::webhook_handler))
        .with_state(ingress_state);

    let ws_routes = Router::new().route("/ws", get(hub_ws::ws_handler)).with_state(ws_state);

    let app = api_routes
        .merge(whatsapp_routes)
        .merge(ws_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "hub-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with an error")?;

    info!("hub-server shut down");
    Ok(())
}

async fn run_email_poll_loop(email: Arc<EmailChannel>, bus: Arc<MessageBus>) {
    if !email.is_healthy().await {
        info!("email channel not configured, IMAP poll loop not started");
        return;
    }
    let mut interval = tokio::time::interval(email.poll_interval());
    loop {
        interval.tick().await;
        match email.poll_once().await {
            Ok(messages) => {
                for msg in messages {
                    if let Err(e) = bus.publish_inbound(msg).await {
                        warn!(error = %e, "email poll: failed to publish inbound message");
                    }
                }
            }
            Err(e) => warn!(error = %e, "email poll: IMAP poll failed"),
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("hub_server=debug,hub_core=debug,hub_orchestrator=debug,info")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}
