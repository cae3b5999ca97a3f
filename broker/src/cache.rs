//! In-process session cache.
//!
//! Maps connection IDs to live handles and reconciles them against the
//! persisted record on every lookup. The store always wins: when the record
//! selects a different database than the cached handle, the handle is
//! patched in place or rebuilt from the record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use common::errors::{AppError, AppResult};
use common::models::{SessionData, SessionInfo};

use crate::connector::{Connection, ConnectionBroker};
use crate::database::Database;
use crate::store::SessionStore;

/// Live handle of one session together with the record it mirrors.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub db: Arc<dyn Database>,
    pub data: SessionData,
    pub proxied: bool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("proxied", &self.proxied)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    fn new(id: &str, connection: Connection, data: SessionData) -> Self {
        Self {
            id: id.to_string(),
            proxied: connection.proxied(),
            db: connection.db,
            data,
        }
    }

    pub fn db_type(&self) -> &str {
        &self.data.db_type
    }

    pub fn current_database(&self) -> Option<&str> {
        self.data.current_database.as_deref()
    }

    pub fn current_table(&self) -> Option<&str> {
        self.data.current_table.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.data.created_at
    }

    /// Public view of the session.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            connection_id: self.id.clone(),
            db_type: self.data.db_type.clone(),
            display_name: self.db.display_name().to_string(),
            current_database: self.data.current_database.clone(),
            current_table: self.data.current_table.clone(),
            proxied: self.proxied,
            created_at: self.data.created_at,
        }
    }
}

/// Session table keyed by connection ID.
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
    broker: Arc<ConnectionBroker>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    /// Per-ID locks serializing patch and rebuild work.
    flights: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>, broker: Arc<ConnectionBroker>) -> Self {
        Self {
            store,
            broker,
            sessions: RwLock::new(HashMap::new()),
            flights: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Returns a handle consistent with the persisted record of `id`.
    pub async fn get_session(&self, id: &str) -> AppResult<SessionHandle> {
        if let Some(data) = self.store.get(id).await? {
            if let Some(handle) = self.refresh(id, &data).await {
                return Ok(handle);
            }
        }

        let lock = self.lock(id).await;
        self.resolve(&lock).await
    }

    /// Takes the per-ID lock that serializes patch, rebuild, switch and
    /// disconnect work on one session.
    pub async fn lock(&self, id: &str) -> SessionLock<'_> {
        let flight = self
            .flights
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone();
        let guard = flight.clone().lock_owned().await;
        SessionLock {
            cache: self,
            id: id.to_string(),
            flight,
            guard: Some(guard),
        }
    }

    /// Reconciles the cached handle with the record while `lock` is held.
    /// A missing record closes whatever handle is still cached.
    pub async fn resolve(&self, lock: &SessionLock<'_>) -> AppResult<SessionHandle> {
        let id = lock.id();
        let Some(data) = self.store.get(id).await? else {
            self.discard(lock, "Session record gone, handle closed").await;
            return Err(AppError::ConnectionNotFound(id.to_string()));
        };

        if let Some(handle) = self.refresh(id, &data).await {
            return Ok(handle);
        }

        if let Some(handle) = self.patch(id, &data).await {
            return Ok(handle);
        }

        let connection = self
            .broker
            .reconnect(&data)
            .await
            .map_err(|e| AppError::RebuildFailed(format!("{}: {}", id, e)))?;

        // The record may have been deleted elsewhere while we were connecting.
        match self.store.get(id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                connection.discard().await;
                return Err(AppError::ConnectionNotFound(id.to_string()));
            }
            Err(e) => {
                connection.discard().await;
                return Err(e);
            }
        }

        let handle = SessionHandle::new(id, connection, data);
        tracing::info!(connection_id = %id, db_type = %handle.db_type(), "Session handle rebuilt");
        self.replace(handle.clone()).await;
        Ok(handle)
    }

    /// Evicts and closes the cached handle of the locked session, if any.
    pub async fn discard(&self, lock: &SessionLock<'_>, reason: &str) {
        let id = lock.id();
        let Some(handle) = self.sessions.write().await.remove(id) else {
            return;
        };
        match handle.db.close().await {
            Ok(()) => tracing::info!(connection_id = %id, "{}", reason),
            Err(e) => tracing::warn!(connection_id = %id, error = %e, "Failed to close discarded handle"),
        }
    }

    /// Fast path: the cached handle already has the record's database.
    async fn refresh(&self, id: &str, data: &SessionData) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let handle = sessions.get_mut(id)?;
        if handle.data.current_database != data.current_database {
            return None;
        }
        handle.data = data.clone();
        Some(handle.clone())
    }

    /// Patch path: re-select the record's database on the live handle. A
    /// handle that cannot be patched is evicted and closed.
    async fn patch(&self, id: &str, data: &SessionData) -> Option<SessionHandle> {
        let stale = self.sessions.read().await.get(id).cloned()?;

        if let Some(target) = data.current_database.as_deref() {
            match stale.db.switch_database(target).await {
                Ok(()) => {
                    let mut sessions = self.sessions.write().await;
                    let handle = sessions.get_mut(id)?;
                    handle.data = data.clone();
                    tracing::info!(connection_id = %id, database = %target, "Session handle patched");
                    return Some(handle.clone());
                }
                Err(e) => {
                    tracing::warn!(connection_id = %id, database = %target, error = %e, "Patch failed, rebuilding session handle");
                }
            }
        }

        self.remove_if_same(id, &stale).await;
        if let Err(e) = stale.db.close().await {
            tracing::warn!(connection_id = %id, error = %e, "Failed to close stale handle");
        }
        None
    }

    async fn remove_if_same(&self, id: &str, stale: &SessionHandle) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(&current.db, &stale.db))
        {
            sessions.remove(id);
        }
    }

    async fn replace(&self, handle: SessionHandle) {
        let previous = self
            .sessions
            .write()
            .await
            .insert(handle.id.clone(), handle.clone());
        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(&p.db, &handle.db)) {
            if let Err(e) = previous.db.close().await {
                tracing::warn!(connection_id = %handle.id, error = %e, "Failed to close replaced handle");
            }
        }
    }

    /// Caches a freshly opened session.
    pub async fn insert(&self, id: &str, connection: Connection, data: SessionData) -> SessionHandle {
        let handle = SessionHandle::new(id, connection, data);
        self.replace(handle.clone()).await;
        handle
    }

    /// Replaces the cached record of the locked session.
    pub async fn update(&self, lock: &SessionLock<'_>, data: SessionData) -> AppResult<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .get_mut(lock.id())
            .ok_or_else(|| AppError::ConnectionNotFound(lock.id().to_string()))?;
        handle.data = data;
        Ok(handle.clone())
    }

    /// Removes `id` without closing its handle.
    pub async fn evict(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sessions with a lock currently held or awaited.
    pub fn pending_locks(&self) -> usize {
        self.flights.lock().len()
    }

    /// Closes and drops every cached handle.
    pub async fn close_all(&self) -> AppResult<()> {
        let drained: Vec<SessionHandle> = self.sessions.write().await.drain().map(|(_, h)| h).collect();

        let mut failures = Vec::new();
        for handle in drained {
            if let Err(e) = handle.db.close().await {
                failures.push(format!("{}: {}", handle.id, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::CloseFailed(failures.join("; ")))
        }
    }
}

/// Exclusive access to one session's reconciliation. The lock entry is
/// dropped from the table once its last holder or waiter is gone.
pub struct SessionLock<'a> {
    cache: &'a SessionCache,
    id: String,
    flight: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLock<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut flights = self.cache.flights.lock();
        // Map entry plus our own reference: nobody else holds or waits.
        let idle = Arc::strong_count(&self.flight) == 2;
        if idle
            && flights
                .get(&self.id)
                .is_some_and(|f| Arc::ptr_eq(f, &self.flight))
        {
            flights.remove(&self.id);
        }
    }
}
