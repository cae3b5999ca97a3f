//! Connection target models.
//!
//! A [`ConnectionInfo`] is what the user declares when opening a session.
//! It is stored verbatim inside the persisted session record and never
//! modified afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// User-declared database target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConnectionInfo {
    /// Engine type tag (`mysql`, `sqlite`, or any registered custom tag).
    #[validate(length(min = 1, max = 32, message = "db_type is required"))]
    pub db_type: String,
    /// Database host (network engines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Database port, defaults per engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "port must be positive"))]
    pub port: Option<u16>,
    /// Login user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Initial database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Database file (file-based engines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Extra DSN parameters passed through to the driver.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
    /// Optional tunnel the connection is routed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub proxy: Option<ProxyConfig>,
}

impl ConnectionInfo {
    /// Creates a bare target for the given engine tag.
    pub fn new(db_type: impl Into<String>) -> Self {
        Self {
            db_type: db_type.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            file_path: None,
            params: HashMap::new(),
            proxy: None,
        }
    }

    /// Normalized engine tag.
    pub fn type_tag(&self) -> String {
        self.db_type.trim().to_lowercase()
    }

    /// Returns the configured port or the engine's well-known default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.type_tag()))
    }
}

/// Well-known port for an engine tag.
pub fn default_port(db_type: &str) -> Option<u16> {
    match db_type {
        "mysql" | "mariadb" => Some(3306),
        "postgres" | "postgresql" => Some(5432),
        "clickhouse" => Some(9000),
        _ => None,
    }
}

/// Tunnel configuration carried alongside a [`ConnectionInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProxyConfig {
    /// Transport type tag (`ssh` or a registered custom tag).
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "proxy type is required"))]
    pub proxy_type: String,
    /// Proxy host.
    #[validate(length(min = 1, message = "proxy host is required"))]
    pub host: String,
    /// Proxy port.
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Proxy login user.
    #[serde(default)]
    pub username: String,
    /// Password authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// PEM/OpenSSH private key for key authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Passphrase protecting `private_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Expected server host key fingerprint (SHA256, base64). Unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
    /// Transport specific extension values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

fn default_proxy_port() -> u16 {
    22
}

impl ProxyConfig {
    /// Normalized transport tag.
    pub fn type_tag(&self) -> String {
        self.proxy_type.trim().to_lowercase()
    }

    /// `host:port` of the proxy itself.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let mut info = ConnectionInfo::new("MySQL");
        assert_eq!(info.port_or_default(), Some(3306));
        info.port = Some(3307);
        assert_eq!(info.port_or_default(), Some(3307));
        assert_eq!(ConnectionInfo::new("sqlite").port_or_default(), None);
    }

    #[test]
    fn test_proxy_deserialize_defaults() {
        let proxy: ProxyConfig =
            serde_json::from_str(r#"{"type":"ssh","host":"bastion","username":"ops"}"#).unwrap();
        assert_eq!(proxy.port, 22);
        assert_eq!(proxy.type_tag(), "ssh");
        assert_eq!(proxy.address(), "bastion:22");
    }

    #[test]
    fn test_validation_rejects_empty_type() {
        let info = ConnectionInfo::new("");
        assert!(info.validate().is_err());
    }
}
