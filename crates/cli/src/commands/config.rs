use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reune_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Effective configuration, one line per key with the layer that supplied it.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in effective_values(&config) {
        let env_key = env_key_for(key_path);
        let source = field_source(
            key_path,
            &env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let api_key = match &config.llm.api_key {
        Some(secret) => redact_secret(secret.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", format!("{:?}", config.llm.provider)),
        ("llm.api_key", api_key),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("llm.model", config.llm.model.clone()),
        ("llm.temperature", config.llm.temperature.to_string()),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("gateway.rate_limit_per_window", config.gateway.rate_limit_per_window.to_string()),
        ("gateway.rate_limit_window_ms", config.gateway.rate_limit_window_ms.to_string()),
        ("gateway.idempotency_ttl_ms", config.gateway.idempotency_ttl_ms.to_string()),
        ("gateway.redact_pii", config.gateway.redact_pii.to_string()),
        ("conversation.history_limit", config.conversation.history_limit.to_string()),
        ("conversation.recent_messages", config.conversation.recent_messages.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

/// `llm.api_key` -> `REUNE_LLM_API_KEY`
fn env_key_for(key_path: &str) -> String {
    format!("REUNE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short vendor prefix such as `gsk-` or `sk-` and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, env_key_for, redact_secret};

    #[test]
    fn env_keys_follow_the_key_path() {
        assert_eq!(env_key_for("llm.api_key"), "REUNE_LLM_API_KEY");
        assert_eq!(
            env_key_for("gateway.rate_limit_per_window"),
            "REUNE_GATEWAY_RATE_LIMIT_PER_WINDOW"
        );
    }

    #[test]
    fn secrets_never_render_in_full() {
        assert_eq!(redact_secret("gsk-abcdef123456"), "gsk-***");
        assert_eq!(redact_secret("plainsecretvalue"), "<redacted>");
        assert_eq!(redact_secret("longprefix-secret"), "<redacted>");
        assert_eq!(redact_secret("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc = "[gateway]\nredact_pii = false\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "gateway.redact_pii"));
        assert!(!contains_path(&doc, "gateway.idempotency_ttl_ms"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
