//! Request-level session operations.
//!
//! Every operation resolves its handle through the [`SessionCache`], so it
//! always acts on the database the persisted record selects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use validator::Validate;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{
    ColumnInfo, ConnectionInfo, QueryResult, SessionData, SessionInfo, TableData, TableDataRequest,
};
use common::utils::{IdGenerator, QueryType, ValidatorChain};

use crate::cache::{SessionCache, SessionHandle};
use crate::connector::ConnectionBroker;
use crate::database::DatabaseFactory;
use crate::dsn::build_dsn;
use crate::pagination;
use crate::proxy::ProxyFactory;
use crate::store::SessionStore;

/// Entry point for everything a client can do with a session.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    broker: Arc<ConnectionBroker>,
    cache: SessionCache,
    validators: Arc<ValidatorChain>,
    ttl: Duration,
}

impl SessionManager {
    /// Manager with the built-in backends and the configured validators.
    pub fn new(config: &AppConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::with_parts(
            store,
            Arc::new(ConnectionBroker::new(config)),
            Arc::new(ValidatorChain::from_names(config.validators.as_slice())),
            config.session_store.ttl(),
        )
    }

    pub fn with_parts(
        store: Arc<dyn SessionStore>,
        broker: Arc<ConnectionBroker>,
        validators: Arc<ValidatorChain>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache: SessionCache::new(store.clone(), broker.clone()),
            store,
            broker,
            validators,
            ttl,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn broker(&self) -> &Arc<ConnectionBroker> {
        &self.broker
    }

    pub fn validators(&self) -> &Arc<ValidatorChain> {
        &self.validators
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn register_database_factory(&self, db_type: &str, factory: Arc<dyn DatabaseFactory>) {
        self.broker.register_database_factory(db_type, factory);
    }

    pub fn register_proxy_factory(&self, proxy_type: &str, factory: Arc<dyn ProxyFactory>) {
        self.broker.register_proxy_factory(proxy_type, factory);
    }

    /// Opens a new session and returns its public view.
    pub async fn connect(&self, info: ConnectionInfo) -> AppResult<SessionInfo> {
        info.validate()?;
        let dsn = build_dsn(&info)?;
        let db_type = info.type_tag();
        let connection = self.broker.open(&db_type, &dsn, info.proxy.as_ref()).await?;

        let id = IdGenerator::connection_id();
        let data = SessionData::new(info, dsn);
        if let Err(e) = self.store.set(&id, &data, self.ttl).await {
            connection.discard().await;
            return Err(e);
        }

        let handle = self.cache.insert(&id, connection, data).await;
        tracing::info!(
            connection_id = %id,
            db_type = %db_type,
            proxied = handle.proxied,
            "Session opened"
        );
        Ok(handle.info())
    }

    /// Ends a session: forgets the record, then evicts and closes the handle.
    /// Runs under the session lock so no rebuild can race it.
    pub async fn disconnect(&self, id: &str) -> AppResult<()> {
        let _lock = self.cache.lock(id).await;
        let persisted = self.store.get(id).await?.is_some();
        if !persisted && !self.cache.contains(id).await {
            return Err(AppError::ConnectionNotFound(id.to_string()));
        }

        let mut failures = Vec::new();
        if let Err(e) = self.store.delete(id).await {
            failures.push(format!("store: {}", e));
        }
        if let Some(handle) = self.cache.evict(id).await {
            if let Err(e) = handle.db.close().await {
                failures.push(format!("handle: {}", e));
            }
        }
        tracing::info!(connection_id = %id, "Session closed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::CloseFailed(failures.join("; ")))
        }
    }

    pub async fn session(&self, id: &str) -> AppResult<SessionHandle> {
        self.cache.get_session(id).await
    }

    pub async fn session_info(&self, id: &str) -> AppResult<SessionInfo> {
        Ok(self.session(id).await?.info())
    }

    /// Selects another database for the session. Selecting the current one
    /// is a no-op.
    ///
    /// Handle, record and cache change together under the session lock, in
    /// that order, so a concurrent lookup never sees a cache ahead of the
    /// store.
    pub async fn switch_database(&self, id: &str, name: &str) -> AppResult<SessionInfo> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("database name is required".into()));
        }
        let lock = self.cache.lock(id).await;
        let handle = self.cache.resolve(&lock).await?;
        if handle.current_database() == Some(name) {
            return Ok(handle.info());
        }

        handle.db.switch_database(name).await?;
        let mut data = handle.data.clone();
        data.current_database = Some(name.to_string());
        data.current_table = None;
        if let Err(e) = self.store.set(id, &data, self.ttl).await {
            // The handle no longer matches the record; rebuild on next use.
            self.cache.discard(&lock, "Switched handle dropped after store failure").await;
            return Err(e);
        }
        let handle = self.cache.update(&lock, data).await?;
        tracing::info!(connection_id = %id, database = %name, "Database switched");
        Ok(handle.info())
    }

    /// Records the table the client is looking at.
    pub async fn switch_table(&self, id: &str, table: &str) -> AppResult<SessionInfo> {
        if table.trim().is_empty() {
            return Err(AppError::Validation("table name is required".into()));
        }
        let lock = self.cache.lock(id).await;
        let handle = self.cache.resolve(&lock).await?;
        let mut data = handle.data.clone();
        data.current_table = Some(table.to_string());
        self.store.set(id, &data, self.ttl).await?;
        let handle = self.cache.update(&lock, data).await?;
        tracing::debug!(connection_id = %id, table = %table, "Table selected");
        Ok(handle.info())
    }

    pub async fn get_databases(&self, id: &str) -> AppResult<Vec<String>> {
        self.session(id).await?.db.get_databases().await
    }

    pub async fn get_tables(&self, id: &str) -> AppResult<Vec<String>> {
        self.session(id).await?.db.get_tables().await
    }

    pub async fn get_table_schema(&self, id: &str, table: &str) -> AppResult<String> {
        self.session(id).await?.db.get_table_schema(table).await
    }

    pub async fn get_table_columns(&self, id: &str, table: &str) -> AppResult<Vec<ColumnInfo>> {
        self.session(id).await?.db.get_table_columns(table).await
    }

    /// Validates and runs a statement.
    pub async fn execute(&self, id: &str, sql: &str) -> AppResult<QueryResult> {
        let query_type = self.validators.check(sql)?;
        let handle = self.session(id).await?;

        let start = Instant::now();
        let result = match query_type {
            QueryType::Select => handle.db.execute_query(sql).await,
            QueryType::Update => handle.db.execute_update(sql).await.map(QueryResult::affected),
            QueryType::Delete => handle.db.execute_delete(sql).await.map(QueryResult::affected),
            QueryType::Insert => handle.db.execute_insert(sql).await.map(QueryResult::affected),
        }
        .map_err(|e| match e {
            e @ AppError::QueryExecutionFailed { .. } => e,
            other => AppError::query(query_type.verb(), other),
        })?;

        tracing::debug!(
            connection_id = %id,
            query_type = %query_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(result.with_elapsed(start.elapsed()))
    }

    /// Reads one page of table data.
    pub async fn get_table_data(&self, id: &str, request: &TableDataRequest) -> AppResult<TableData> {
        let handle = self.session(id).await?;
        pagination::read_page(handle.db.as_ref(), request).await
    }

    /// Resolves the keyset cursor that starts `page`.
    pub async fn get_page_id(
        &self,
        id: &str,
        table: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Option<i64>> {
        if page == 0 || page_size == 0 {
            return Err(AppError::Validation("page and page_size must be at least 1".into()));
        }
        let handle = self.session(id).await?;
        let columns = handle.db.get_table_columns(table).await?;
        let pk = pagination::keyset_column(&columns).ok_or_else(|| {
            AppError::PaginationUnsupported(format!("{} has no single integer primary key", table))
        })?;
        handle
            .db
            .get_page_id_by_page_number(table, &pk.name, page, page_size)
            .await
    }

    /// Closes every cached handle and the store.
    pub async fn close(&self) -> AppResult<()> {
        let cache_result = self.cache.close_all().await;
        let store_result = self.store.close().await;
        cache_result.and(store_result)
    }
}
