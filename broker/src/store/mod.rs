//! Persisted session records.
//!
//! The store is the source of truth for every session; the in-process cache
//! only ever follows it. Records expire after their TTL.

mod memory;
mod mysql;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::config::{SessionStoreConfig, SessionStoreKind};
use common::errors::{AppError, AppResult};
use common::models::SessionData;

pub use self::memory::MemorySessionStore;
pub use self::mysql::MySqlSessionStore;
pub use self::redis::RedisSessionStore;

/// Key/value persistence for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads a record. Expired and unknown IDs both yield `None`.
    async fn get(&self, id: &str) -> AppResult<Option<SessionData>>;

    /// Writes (or replaces) a record with a fresh TTL.
    async fn set(&self, id: &str, data: &SessionData, ttl: Duration) -> AppResult<()>;

    /// Removes a record. Unknown IDs are not an error.
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Releases store resources.
    async fn close(&self) -> AppResult<()>;

    /// Backend tag, for logs and health output.
    fn kind(&self) -> &'static str;
}

/// Builds the store selected by configuration.
pub async fn build_session_store(config: &SessionStoreConfig) -> AppResult<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.kind {
        SessionStoreKind::Memory => Arc::new(MemorySessionStore::new()),
        SessionStoreKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| AppError::SessionStore("REDIS_URL is required for the redis store".into()))?;
            Arc::new(RedisSessionStore::connect(url).await?)
        }
        SessionStoreKind::MySql => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                AppError::SessionStore("DATABASE_URL is required for the mysql store".into())
            })?;
            Arc::new(MySqlSessionStore::connect(url).await?)
        }
    };
    tracing::info!(store = store.kind(), ttl_secs = config.ttl_secs, "Session store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_store() {
        let config = SessionStoreConfig {
            kind: SessionStoreKind::Memory,
            redis_url: None,
            database_url: None,
            ttl_secs: 60,
        };
        let store = build_session_store(&config).await.unwrap();
        assert_eq!(store.kind(), "memory");
    }

    #[tokio::test]
    async fn test_remote_store_requires_url() {
        let config = SessionStoreConfig {
            kind: SessionStoreKind::Redis,
            redis_url: None,
            database_url: None,
            ttl_secs: 60,
        };
        assert!(matches!(
            build_session_store(&config).await,
            Err(AppError::SessionStore(_))
        ));
    }
}
