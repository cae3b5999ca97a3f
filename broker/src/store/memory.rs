//! In-process session store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use common::errors::AppResult;
use common::models::SessionData;

use super::SessionStore;

struct Entry {
    data: SessionData,
    expires_at: Instant,
}

/// Map backed store. Expired records stay in memory until
/// [`purge_expired`](MemorySessionStore::purge_expired) runs but are never
/// returned.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired records, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> AppResult<Option<SessionData>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(id)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.data.clone()))
    }

    async fn set(&self, id: &str, data: &SessionData, ttl: Duration) -> AppResult<()> {
        let entry = Entry {
            data: data.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(id.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
