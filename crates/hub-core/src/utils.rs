//! Utility helpers — path resolution, date formatting, string manipulation.

use std::path::PathBuf;

/// Get the hub data directory (e.g. `~/.hub/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".hub")
}

/// Get current ISO 8601 timestamp.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Normalizes a channel user id the way WhatsApp providers require:
/// strip a leading `+`, strip a trailing `@c.us`, strip whitespace.
pub fn normalize_whatsapp_user_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('+')
        .trim_end_matches("@c.us")
        .trim()
        .to_string()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_unicode() {
        let result = truncate_string("こんにちは世界です", 5);
        assert_eq!(result, "こん...");
    }

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn test_normalize_whatsapp_user_id_strips_plus_and_suffix() {
        assert_eq!(normalize_whatsapp_user_id("+593991234567@c.us"), "593991234567");
        assert_eq!(normalize_whatsapp_user_id("  +14155551234  "), "14155551234");
    }

    #[test]
    fn test_normalize_whatsapp_user_id_plain_digits() {
        assert_eq!(normalize_whatsapp_user_id("593991234567"), "593991234567");
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/test/path");
        assert!(!expanded.starts_with("~"));
    }

    #[test]
    fn test_timestamp_is_valid() {
        let ts = timestamp();
        chrono::DateTime::parse_from_rfc3339(&ts).unwrap();
    }
}
