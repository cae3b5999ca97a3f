//! Redis session store.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use async_trait::async_trait;

use common::errors::{AppError, AppResult};
use common::models::SessionData;

use super::SessionStore;

/// Prefix of every session key.
pub const KEY_PREFIX: &str = "dbm:session:";

/// Records are JSON strings under `dbm:session:<id>` with a native TTL.
pub struct RedisSessionStore {
    manager: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = ::redis::Client::open(url)
            .map_err(|e| AppError::SessionStore(format!("redis: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::SessionStore(format!("redis: {}", e)))?;
        Ok(Self { manager })
    }
}

fn key(id: &str) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

fn store_err(e: ::redis::RedisError) -> AppError {
    AppError::SessionStore(format!("redis: {}", e))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, id: &str) -> AppResult<Option<SessionData>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = ::redis::cmd("GET")
            .arg(key(id))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn set(&self, id: &str, data: &SessionData, ttl: Duration) -> AppResult<()> {
        let json = serde_json::to_string(data)?;
        let mut conn = self.manager.clone();
        ::redis::cmd("SET")
            .arg(key(id))
            .arg(json)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        ::redis::cmd("DEL")
            .arg(key(id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        assert_eq!(key("abc"), "dbm:session:abc");
    }
}
