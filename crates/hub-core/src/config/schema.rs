//! Typed configuration schema. Field names are camelCase on the wire
//! (JSON config file) and overridable via `HUB_<SECTION>__<FIELD>`
//! environment variables — see `loader.rs`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub providers: HashMap<String, ProviderConfig>,
    pub gateway: GatewayConfig,
    pub whatsapp: WhatsAppConfig,
    pub telegram: TelegramConfig,
    pub email: EmailConfig,
    pub webchat: WebchatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
            providers: default_providers(),
            gateway: GatewayConfig::default(),
            whatsapp: WhatsAppConfig::default(),
            telegram: TelegramConfig::default(),
            email: EmailConfig::default(),
            webchat: WebchatConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub webhook_ack_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            webhook_ack_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "postgres://localhost/hub".to_string(),
            max_connections: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig { url: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub webchat_token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: "change-me-in-production".to_string(),
            webchat_token_ttl_secs: 24 * 3600,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub context_ttl_secs: u64,
    pub max_history_messages: usize,
    pub max_external_context_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            context_ttl_secs: 3600,
            max_history_messages: crate::domain::MAX_HISTORY_MESSAGES,
            max_external_context_chars: crate::domain::MAX_EXTERNAL_CONTEXT_CHARS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub priority: i32,
    /// USD per million input tokens; feeds the least-cost selection
    /// strategy and `UsageInfo::cost_usd`.
    pub price_in_per_million: f64,
    /// USD per million output tokens.
    pub price_out_per_million: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_key: String::new(),
            api_base: None,
            extra_headers: None,
            priority: 0,
            price_in_per_million: 0.0,
            price_out_per_million: 0.0,
        }
    }
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    HashMap::new()
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    RoundRobin,
    LeastLatency,
    LeastCost,
    Priority,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub selection_strategy: SelectionStrategy,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub enable_fallback: bool,
    pub max_tool_executions: u32,
    /// Model identifier used for a turn when its flow names no override,
    /// e.g. `"anthropic/claude-sonnet-4-20250514"`.
    pub default_model: String,
    pub max_history_messages: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            selection_strategy: SelectionStrategy::Priority,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            enable_fallback: true,
            max_tool_executions: 10,
            default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
            max_history_messages: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppConfig {
    /// `false` is fail-loud, not a silent synchronous-send fallback — see
    /// `SPEC_FULL.md` §9.
    pub use_queue: bool,
    pub webhook_verify_token: String,
    pub socket_max: usize,
    pub socket_free: usize,
    pub request_timeout_secs: u64,
    /// Per-instance credentials keyed by channel config id.
    pub instances: HashMap<String, WhatsAppInstanceConfig>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        WhatsAppConfig {
            use_queue: true,
            webhook_verify_token: String::new(),
            socket_max: 50,
            socket_free: 10,
            request_timeout_secs: 60,
            instances: HashMap::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhatsAppProvider {
    Dialog360,
    Ultramsg,
    Twilio,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppInstanceConfig {
    pub provider: WhatsAppProvider,
    pub api_key: String,
    pub phone_number_id: Option<String>,
    pub instance_id: Option<String>,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
}

impl Default for WhatsAppInstanceConfig {
    fn default() -> Self {
        WhatsAppInstanceConfig {
            provider: WhatsAppProvider::Dialog360,
            api_key: String::new(),
            phone_number_id: None,
            instance_id: None,
            account_sid: None,
            auth_token: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig { bot_token: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: String,
    pub poll_interval_secs: u64,
    pub max_body_chars: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            imap_host: String::new(),
            imap_port: 993,
            imap_user: String::new(),
            imap_password: String::new(),
            poll_interval_secs: 30,
            max_body_chars: 12_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebchatConfig {
    pub allowed_origins: Vec<String>,
    pub auth_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub greeting_window_secs: i64,
}

impl Default for WebchatConfig {
    fn default() -> Self {
        WebchatConfig {
            allowed_origins: Vec::new(),
            auth_timeout_secs: 20,
            ping_interval_secs: 60,
            greeting_window_secs: 5,
        }
    }
}
