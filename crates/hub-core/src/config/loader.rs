//! Config loading — defaults, then an optional JSON file, then
//! `HUB_<SECTION>__<FIELD>` environment variable overrides.

use super::schema::Config;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default config file path, `~/.hub/config.json`.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load config from the default path, falling back to defaults if absent.
pub fn load_config(path: Option<&Path>) -> Config {
    let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&path)
}

/// Load config from a specific path, applying env overrides on top.
pub fn load_config_from_path(path: &Path) -> Config {
    let mut cfg = if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(cfg) => {
                    debug!(path = %path.display(), "Loaded config file");
                    cfg
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Config::default()
            }
        }
    } else {
        debug!(path = %path.display(), "No config file found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut cfg);
    cfg
}

/// Persist config to disk as pretty JSON, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Apply `HUB_<SECTION>__<FIELD>` style overrides on top of a loaded
/// config, plus a handful of bare, conventionally-named env vars
/// (`DATABASE_URL`, `REDIS_URL`, `JWT_SECRET`, ...) that take precedence
/// over the namespaced form when set.
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DATABASE_URL") {
        cfg.database.url = v;
    }
    if let Ok(v) = std::env::var("REDIS_URL") {
        cfg.redis.url = Some(v);
    }
    if let Ok(v) = std::env::var("JWT_SECRET") {
        cfg.auth.jwt_secret = v;
    }
    if let Ok(v) = std::env::var("MCP_CONTEXT_TTL") {
        if let Ok(n) = v.parse() {
            cfg.session.context_ttl_secs = n;
        }
    }
    if let Ok(v) = std::env::var("USE_QUEUE_FOR_WHATSAPP") {
        cfg.whatsapp.use_queue = v != "false" && v != "0";
    }
    if let Ok(v) = std::env::var("WEBCHAT_ALLOWED_ORIGINS") {
        cfg.webchat.allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
        cfg.telegram.bot_token = Some(v);
    }

    for (section, key) in [
        ("SERVER", "BIND_ADDR"),
        ("DATABASE", "URL"),
        ("DATABASE", "MAX_CONNECTIONS"),
        ("AUTH", "JWT_SECRET"),
        ("SESSION", "CONTEXT_TTL_SECS"),
        ("SESSION", "MAX_HISTORY_MESSAGES"),
        ("GATEWAY", "SELECTION_STRATEGY"),
        ("GATEWAY", "CIRCUIT_BREAKER_THRESHOLD"),
        ("GATEWAY", "RETRY_ATTEMPTS"),
        ("WHATSAPP", "USE_QUEUE"),
        ("WHATSAPP", "WEBHOOK_VERIFY_TOKEN"),
        ("EMAIL", "SMTP_HOST"),
        ("EMAIL", "SMTP_USER"),
        ("EMAIL", "SMTP_PASSWORD"),
        ("EMAIL", "IMAP_HOST"),
    ] {
        let var_name = format!("HUB_{}__{}", section, key);
        if let Ok(value) = std::env::var(&var_name) {
            apply_single_override(cfg, section, key, &value);
        }
    }
}

fn apply_single_override(cfg: &mut Config, section: &str, key: &str, value: &str) {
    match (section, key) {
        ("SERVER", "BIND_ADDR") => cfg.server.bind_addr = value.to_string(),
        ("DATABASE", "URL") => cfg.database.url = value.to_string(),
        ("DATABASE", "MAX_CONNECTIONS") => {
            if let Ok(n) = value.parse() {
                cfg.database.max_connections = n;
            }
        }
        ("AUTH", "JWT_SECRET") => cfg.auth.jwt_secret = value.to_string(),
        ("SESSION", "CONTEXT_TTL_SECS") => {
            if let Ok(n) = value.parse() {
                cfg.session.context_ttl_secs = n;
            }
        }
        ("SESSION", "MAX_HISTORY_MESSAGES") => {
            if let Ok(n) = value.parse() {
                cfg.session.max_history_messages = n;
            }
        }
        ("GATEWAY", "CIRCUIT_BREAKER_THRESHOLD") => {
            if let Ok(n) = value.parse() {
                cfg.gateway.circuit_breaker_threshold = n;
            }
        }
        ("GATEWAY", "RETRY_ATTEMPTS") => {
            if let Ok(n) = value.parse() {
                cfg.gateway.retry_attempts = n;
            }
        }
        ("WHATSAPP", "USE_QUEUE") => cfg.whatsapp.use_queue = value != "false" && value != "0",
        ("WHATSAPP", "WEBHOOK_VERIFY_TOKEN") => cfg.whatsapp.webhook_verify_token = value.to_string(),
        ("EMAIL", "SMTP_HOST") => cfg.email.smtp_host = value.to_string(),
        ("EMAIL", "SMTP_USER") => cfg.email.smtp_user = value.to_string(),
        ("EMAIL", "SMTP_PASSWORD") => cfg.email.smtp_password = value.to_string(),
        ("EMAIL", "IMAP_HOST") => cfg.email.imap_host = value.to_string(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = load_config_from_path(&path);
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.server.bind_addr = "127.0.0.1:9090".to_string();
        save_config(&cfg, &path).unwrap();

        let loaded = load_config_from_path(&path);
        assert_eq!(loaded.server.bind_addr, "127.0.0.1:9090");
    }

    #[test]
    fn test_database_url_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://test/override");
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from_path(&dir.path().join("config.json"));
        assert_eq!(cfg.database.url, "postgres://test/override");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    fn test_use_queue_for_whatsapp_false_is_fail_loud_not_removed() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("USE_QUEUE_FOR_WHATSAPP", "false");
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from_path(&dir.path().join("config.json"));
        assert!(!cfg.whatsapp.use_queue);
        std::env::remove_var("USE_QUEUE_FOR_WHATSAPP");
    }

    #[test]
    fn test_namespaced_override_takes_effect() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("HUB_GATEWAY__RETRY_ATTEMPTS", "7");
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from_path(&dir.path().join("config.json"));
        assert_eq!(cfg.gateway.retry_attempts, 7);
        std::env::remove_var("HUB_GATEWAY__RETRY_ATTEMPTS");
    }
}
