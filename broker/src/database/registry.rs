//! Name-keyed backend factory registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};

use super::{DatabaseFactory, MySqlFactory, SqliteFactory};
use crate::proxy::DialerRegistry;

/// Pool settings applied to built-in backends.
#[derive(Debug, Clone, Copy)]
pub struct BackendOptions {
    /// Maximum physical connections behind one handle.
    pub max_connections: u32,
    /// Timeout for acquiring a connection.
    pub connect_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&AppConfig> for BackendOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Resolves backend factories by type tag.
///
/// Custom registrations shadow built-ins with the same tag.
pub struct DatabaseRegistry {
    custom: RwLock<HashMap<String, Arc<dyn DatabaseFactory>>>,
    builtin: HashMap<String, Arc<dyn DatabaseFactory>>,
}

impl DatabaseRegistry {
    /// Registry without built-ins.
    pub fn empty() -> Self {
        Self {
            custom: RwLock::new(HashMap::new()),
            builtin: HashMap::new(),
        }
    }

    /// Registry with the built-in MySQL and SQLite backends.
    pub fn with_builtins(dialers: Arc<DialerRegistry>, options: BackendOptions) -> Self {
        let mysql: Arc<dyn DatabaseFactory> = Arc::new(MySqlFactory::new(dialers, options));
        let sqlite: Arc<dyn DatabaseFactory> = Arc::new(SqliteFactory::new(options));

        let mut builtin = HashMap::new();
        builtin.insert("mysql".to_string(), mysql.clone());
        builtin.insert("mariadb".to_string(), mysql);
        builtin.insert("sqlite".to_string(), sqlite);

        Self {
            custom: RwLock::new(HashMap::new()),
            builtin,
        }
    }

    /// Registers a custom factory.
    pub fn register(&self, db_type: &str, factory: Arc<dyn DatabaseFactory>) {
        let tag = normalize(db_type);
        tracing::info!(db_type = %tag, "Database factory registered");
        self.custom.write().insert(tag, factory);
    }

    /// Removes a custom factory. Built-ins cannot be removed.
    pub fn unregister(&self, db_type: &str) -> bool {
        self.custom.write().remove(&normalize(db_type)).is_some()
    }

    /// Looks up the factory for a tag.
    pub fn resolve(&self, db_type: &str) -> AppResult<Arc<dyn DatabaseFactory>> {
        let tag = normalize(db_type);
        if let Some(factory) = self.custom.read().get(&tag) {
            return Ok(factory.clone());
        }
        self.builtin
            .get(&tag)
            .cloned()
            .ok_or(AppError::UnsupportedDatabaseType(tag))
    }

    /// All known tags, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.builtin.keys().cloned().collect();
        tags.extend(self.custom.read().keys().cloned());
        tags.sort();
        tags.dedup();
        tags
    }
}

fn normalize(db_type: &str) -> String {
    db_type.trim().to_lowercase()
}
