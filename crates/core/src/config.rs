use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_EXPIRATION_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
const MIN_EMPLOYEE_TOKEN_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub negotiation: NegotiationConfig,
    pub sweeper: SweeperConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    pub max_attempts: u32,
    pub expiration_window_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Upper bound for each individual store call made during a sweep.
    pub store_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub employee_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub employee_token: Option<String>,
    pub max_attempts: Option<u32>,
    pub expiration_window_secs: Option<u64>,
    pub sweeper_enabled: Option<bool>,
    pub sweeper_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://haggle.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            negotiation: NegotiationConfig {
                max_attempts: 3,
                expiration_window_secs: 7 * 24 * 60 * 60,
            },
            sweeper: SweeperConfig {
                enabled: true,
                interval_secs: 60 * 60,
                store_timeout_secs: 10,
            },
            auth: AuthConfig { employee_token: String::new().into() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("haggle.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(negotiation) = patch.negotiation {
            if let Some(max_attempts) = negotiation.max_attempts {
                self.negotiation.max_attempts = max_attempts;
            }
            if let Some(expiration_window_secs) = negotiation.expiration_window_secs {
                self.negotiation.expiration_window_secs = expiration_window_secs;
            }
        }

        if let Some(sweeper) = patch.sweeper {
            if let Some(enabled) = sweeper.enabled {
                self.sweeper.enabled = enabled;
            }
            if let Some(interval_secs) = sweeper.interval_secs {
                self.sweeper.interval_secs = interval_secs;
            }
            if let Some(store_timeout_secs) = sweeper.store_timeout_secs {
                self.sweeper.store_timeout_secs = store_timeout_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(employee_token_value) = auth.employee_token {
                self.auth.employee_token = secret_value(employee_token_value);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HAGGLE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HAGGLE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("HAGGLE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HAGGLE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HAGGLE_SERVER_PORT") {
            self.server.port = parse_u16("HAGGLE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HAGGLE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_NEGOTIATION_MAX_ATTEMPTS") {
            self.negotiation.max_attempts = parse_u32("HAGGLE_NEGOTIATION_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_NEGOTIATION_EXPIRATION_WINDOW_SECS") {
            self.negotiation.expiration_window_secs =
                parse_u64("HAGGLE_NEGOTIATION_EXPIRATION_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_SWEEPER_ENABLED") {
            self.sweeper.enabled = parse_bool("HAGGLE_SWEEPER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_SWEEPER_INTERVAL_SECS") {
            self.sweeper.interval_secs = parse_u64("HAGGLE_SWEEPER_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("HAGGLE_SWEEPER_STORE_TIMEOUT_SECS") {
            self.sweeper.store_timeout_secs =
                parse_u64("HAGGLE_SWEEPER_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HAGGLE_AUTH_EMPLOYEE_TOKEN") {
            self.auth.employee_token = secret_value(value);
        }

        let log_level = read_env("HAGGLE_LOGGING_LEVEL").or_else(|| read_env("HAGGLE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HAGGLE_LOGGING_FORMAT").or_else(|| read_env("HAGGLE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(employee_token) = overrides.employee_token {
            self.auth.employee_token = secret_value(employee_token);
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.negotiation.max_attempts = max_attempts;
        }
        if let Some(expiration_window_secs) = overrides.expiration_window_secs {
            self.negotiation.expiration_window_secs = expiration_window_secs;
        }
        if let Some(enabled) = overrides.sweeper_enabled {
            self.sweeper.enabled = enabled;
        }
        if let Some(interval_secs) = overrides.sweeper_interval_secs {
            self.sweeper.interval_secs = interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_negotiation(&self.negotiation)?;
        validate_sweeper(&self.sweeper)?;
        validate_auth(&self.auth)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("haggle.toml"), PathBuf::from("config/haggle.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_negotiation(negotiation: &NegotiationConfig) -> Result<(), ConfigError> {
    if negotiation.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "negotiation.max_attempts must be at least 1 (the initial offer counts)".to_string(),
        ));
    }

    if negotiation.expiration_window_secs == 0
        || negotiation.expiration_window_secs > MAX_EXPIRATION_WINDOW_SECS
    {
        return Err(ConfigError::Validation(format!(
            "negotiation.expiration_window_secs must be in range 1..={MAX_EXPIRATION_WINDOW_SECS}"
        )));
    }

    Ok(())
}

fn validate_sweeper(sweeper: &SweeperConfig) -> Result<(), ConfigError> {
    if sweeper.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweeper.interval_secs must be greater than zero".to_string(),
        ));
    }

    if sweeper.store_timeout_secs == 0 || sweeper.store_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "sweeper.store_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let employee_token = auth.employee_token.expose_secret();
    if employee_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.employee_token is required (set HAGGLE_AUTH_EMPLOYEE_TOKEN or [auth] employee_token)"
                .to_string(),
        ));
    }
    if employee_token.len() < MIN_EMPLOYEE_TOKEN_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.employee_token must be at least {MIN_EMPLOYEE_TOKEN_LEN} characters"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    negotiation: Option<NegotiationPatch>,
    sweeper: Option<SweeperPatch>,
    auth: Option<AuthPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationPatch {
    max_attempts: Option<u32>,
    expiration_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SweeperPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    store_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    employee_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    const TOKEN: &str = "employee-token-0123456789";

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_carry_negotiation_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", TOKEN);
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.negotiation.max_attempts == 3, "default cap is three attempts")?;
            ensure(
                config.negotiation.expiration_window_secs == 604_800,
                "default window is seven days",
            )?;
            ensure(config.sweeper.interval_secs == 3_600, "default sweep runs hourly")?;
            ensure(config.sweeper.enabled, "sweeper is enabled by default")
        })();

        clear_vars(&["HAGGLE_AUTH_EMPLOYEE_TOKEN"]);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HAGGLE_EMPLOYEE_TOKEN", TOKEN);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("haggle.toml");
            fs::write(
                &path,
                r#"
[auth]
employee_token = "${TEST_HAGGLE_EMPLOYEE_TOKEN}"

[negotiation]
max_attempts = 5
expiration_window_secs = 3600
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.auth.employee_token.expose_secret() == TOKEN,
                "employee token should be loaded from environment",
            )?;
            ensure(config.negotiation.max_attempts == 5, "file should set max attempts")?;
            ensure(
                config.negotiation.expiration_window_secs == 3_600,
                "file should set expiration window",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_HAGGLE_EMPLOYEE_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", TOKEN);
        env::set_var("HAGGLE_LOG_LEVEL", "warn");
        env::set_var("HAGGLE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HAGGLE_AUTH_EMPLOYEE_TOKEN", "HAGGLE_LOG_LEVEL", "HAGGLE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("HAGGLE_SWEEPER_INTERVAL_SECS", "120");
        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", TOKEN);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("haggle.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sweeper]
interval_secs = 900
store_timeout_secs = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.sweeper.interval_secs == 120, "env sweep interval should win over file")?;
            ensure(config.sweeper.store_timeout_secs == 5, "file store timeout should apply")?;
            Ok(())
        })();

        clear_vars(&[
            "HAGGLE_DATABASE_URL",
            "HAGGLE_SWEEPER_INTERVAL_SECS",
            "HAGGLE_AUTH_EMPLOYEE_TOKEN",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", "short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("auth.employee_token")
            );
            ensure(has_message, "validation failure should mention auth.employee_token")
        })();

        clear_vars(&["HAGGLE_AUTH_EMPLOYEE_TOKEN"]);
        result
    }

    #[test]
    fn zero_attempt_cap_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                employee_token: Some(TOKEN.to_string()),
                max_attempts: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let has_message = matches!(
            result,
            Err(ConfigError::Validation(ref message))
                if message.contains("negotiation.max_attempts")
        );
        ensure(has_message, "validation failure should mention negotiation.max_attempts")
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", TOKEN);
        env::set_var("HAGGLE_SWEEPER_INTERVAL_SECS", "hourly");

        let result = (|| -> Result<(), String> {
            let reported = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "HAGGLE_SWEEPER_INTERVAL_SECS"
            );
            ensure(reported, "bad interval should be reported with its key")
        })();

        clear_vars(&["HAGGLE_AUTH_EMPLOYEE_TOKEN", "HAGGLE_SWEEPER_INTERVAL_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HAGGLE_AUTH_EMPLOYEE_TOKEN", "employee-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("employee-secret-value"),
                "debug output should not contain employee token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["HAGGLE_AUTH_EMPLOYEE_TOKEN"]);
        result
    }
}
