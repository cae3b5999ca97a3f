//! Application configuration.
//!
//! Configuration is read from environment variables. Binaries call
//! [`load_dotenv`] first so a local `.env` file can provide defaults.

use std::time::Duration;

/// Session store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreKind {
    /// In-process map, lost on restart.
    Memory,
    /// Redis key/value store.
    Redis,
    /// MySQL table.
    MySql,
}

impl SessionStoreKind {
    /// Parses a store tag, falling back to memory for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "redis" => SessionStoreKind::Redis,
            "mysql" => SessionStoreKind::MySql,
            "memory" | "" => SessionStoreKind::Memory,
            other => {
                tracing::warn!(store = %other, "Unknown session store, using memory");
                SessionStoreKind::Memory
            }
        }
    }
}

impl std::fmt::Display for SessionStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreKind::Memory => write!(f, "memory"),
            SessionStoreKind::Redis => write!(f, "redis"),
            SessionStoreKind::MySql => write!(f, "mysql"),
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Which backend persists session records.
    pub kind: SessionStoreKind,
    /// Redis URL (used when `kind` is redis).
    pub redis_url: Option<String>,
    /// MySQL URL (used when `kind` is mysql).
    pub database_url: Option<String>,
    /// Lifetime of a session record.
    pub ttl_secs: u64,
}

impl SessionStoreConfig {
    /// Returns the session TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Top level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and responses.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Timeout for establishing backend connections.
    pub connect_timeout_secs: u64,
    /// Maximum physical connections behind one logical session handle.
    pub max_connections: u32,
    /// Default page size for table browsing.
    pub default_page_size: u32,
    /// Enabled SQL validators, in execution order.
    pub validators: Vec<String>,
    /// Session store settings.
    pub session_store: SessionStoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "connection-service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8081,
            connect_timeout_secs: 10,
            max_connections: 5,
            default_page_size: 50,
            validators: vec![
                "require_limit".to_string(),
                "forbid_drop_table".to_string(),
                "forbid_truncate".to_string(),
            ],
            session_store: SessionStoreConfig {
                kind: SessionStoreKind::Memory,
                redis_url: None,
                database_url: None,
                ttl_secs: 24 * 60 * 60,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from the environment for the named service.
    pub fn load_with_service(service_name: &str) -> Self {
        let defaults = Self::default();
        let validators = match std::env::var("SQL_VALIDATORS") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.validators,
        };

        Self {
            service_name: service_name.to_string(),
            host: env_or("SERVER_HOST", defaults.host),
            port: env_parse("SERVER_PORT", defaults.port),
            connect_timeout_secs: env_parse("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            max_connections: env_parse("MAX_CONNECTIONS", defaults.max_connections),
            default_page_size: env_parse("DEFAULT_PAGE_SIZE", defaults.default_page_size),
            validators,
            session_store: SessionStoreConfig {
                kind: SessionStoreKind::parse(&env_or("SESSION_STORE", "memory".to_string())),
                redis_url: std::env::var("REDIS_URL").ok(),
                database_url: std::env::var("DATABASE_URL").ok(),
                ttl_secs: env_parse("SESSION_TTL_SECS", defaults.session_store.ttl_secs),
            },
        }
    }

    /// Returns the backend connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load .env file from the working directory (best-effort, no error if missing).
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if let Ok(content) = std::fs::read_to_string(env_path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                // Only set if not already set by the environment
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value.trim());
                }
            }
        }
    }
}
