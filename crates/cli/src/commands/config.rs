use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use maitre_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// Renders every effective setting with the layer it came from. Secrets are redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let service_slots = config
        .reservations
        .service_slots
        .iter()
        .map(|slot| slot.label())
        .collect::<Vec<_>>()
        .join(", ");

    let entries: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", config.llm.provider.as_str().to_string()),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", optional(config.llm.base_url.as_deref())),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref())),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("llm.max_retries", config.llm.max_retries.to_string()),
        ("embedding.provider", config.embedding.provider.as_str().to_string()),
        ("embedding.model", config.embedding.model.clone()),
        ("embedding.base_url", optional(config.embedding.base_url.as_deref())),
        ("embedding.api_key", redact_secret(config.embedding.api_key.as_ref())),
        ("embedding.dimension", config.embedding.dimension.to_string()),
        ("embedding.batch_size", config.embedding.batch_size.to_string()),
        (
            "knowledge_base.documents_dir",
            config.knowledge_base.documents_dir.display().to_string(),
        ),
        ("knowledge_base.top_k", config.knowledge_base.top_k.to_string()),
        ("knowledge_base.chunk_size", config.knowledge_base.chunk_size.to_string()),
        ("knowledge_base.chunk_overlap", config.knowledge_base.chunk_overlap.to_string()),
        (
            "capacity.max_capacity",
            config
                .capacity
                .max_capacity
                .map(|value| value.to_string())
                .unwrap_or_else(|| "<from policy>".to_string()),
        ),
        ("capacity.granularity", config.capacity.granularity.as_str().to_string()),
        (
            "capacity.policy_document",
            optional(
                config
                    .capacity
                    .policy_document
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .as_deref(),
            ),
        ),
        ("reservations.service_slots", service_slots),
        ("reservations.default_slot", config.reservations.default_slot.label()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("server.session_idle_secs", config.server.session_idle_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in entries {
        let env_key = env_key_for(key_path);
        lines.push(render_line(
            key_path,
            &value,
            field_source(
                key_path,
                Some(&env_key),
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    lines.join("\n")
}

fn env_key_for(key_path: &str) -> String {
    format!("MAITRE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
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

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
