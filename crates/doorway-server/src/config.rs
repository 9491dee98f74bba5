//! Server configuration from `DOORWAY_*` environment variables.

use doorway_auth::AuthConfig;
use doorway_db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,
    pub auth: AuthConfig,
    pub db: DbConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            auth: AuthConfig::default(),
            db: DbConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep
    /// their defaults; `DOORWAY_SECRET_KEY_BASE` is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("DOORWAY_BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.auth.secret_key_base =
            lookup("DOORWAY_SECRET_KEY_BASE").ok_or(ConfigError::Missing("DOORWAY_SECRET_KEY_BASE"))?;
        if let Some(url) = lookup("DOORWAY_BASE_URL") {
            config.auth.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("DOORWAY_SECURE_COOKIES") {
            config.auth.secure_cookies = parse_bool("DOORWAY_SECURE_COOKIES", &value)?;
        }
        config
            .auth
            .validate()
            .map_err(|e| ConfigError::Invalid {
                key: "DOORWAY_SECRET_KEY_BASE",
                message: e.to_string(),
            })?;

        if let Some(url) = lookup("DOORWAY_DB_URL") {
            config.db.url = url;
        }
        if let Some(ns) = lookup("DOORWAY_DB_NAMESPACE") {
            config.db.namespace = ns;
        }
        if let Some(db) = lookup("DOORWAY_DB_DATABASE") {
            config.db.database = db;
        }
        config.db.username = lookup("DOORWAY_DB_USERNAME");
        config.db.password = lookup("DOORWAY_DB_PASSWORD");

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
