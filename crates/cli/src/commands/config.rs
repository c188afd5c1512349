use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use haggle_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One rendered config field: dotted key, display value, env override.
struct Field {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_key: &'static str) -> Self {
        Self { key, value: value.to_string(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", &config.database.url, "HAGGLE_DATABASE_URL"),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            "HAGGLE_DATABASE_MAX_CONNECTIONS",
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            "HAGGLE_DATABASE_TIMEOUT_SECS",
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            "HAGGLE_SERVER_BIND_ADDRESS",
        ),
        Field::new("server.port", config.server.port, "HAGGLE_SERVER_PORT"),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            "HAGGLE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        Field::new(
            "negotiation.max_attempts",
            config.negotiation.max_attempts,
            "HAGGLE_NEGOTIATION_MAX_ATTEMPTS",
        ),
        Field::new(
            "negotiation.expiration_window_secs",
            config.negotiation.expiration_window_secs,
            "HAGGLE_NEGOTIATION_EXPIRATION_WINDOW_SECS",
        ),
        Field::new("sweeper.enabled", config.sweeper.enabled, "HAGGLE_SWEEPER_ENABLED"),
        Field::new(
            "sweeper.interval_secs",
            config.sweeper.interval_secs,
            "HAGGLE_SWEEPER_INTERVAL_SECS",
        ),
        Field::new(
            "sweeper.store_timeout_secs",
            config.sweeper.store_timeout_secs,
            "HAGGLE_SWEEPER_STORE_TIMEOUT_SECS",
        ),
        Field::new(
            "auth.employee_token",
            redact_token(config.auth.employee_token.expose_secret()),
            "HAGGLE_AUTH_EMPLOYEE_TOKEN",
        ),
        Field::new("logging.level", &config.logging.level, "HAGGLE_LOGGING_LEVEL"),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            "HAGGLE_LOGGING_FORMAT",
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["haggle.toml", "config/haggle.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
