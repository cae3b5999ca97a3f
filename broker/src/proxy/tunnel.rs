//! Backend wrapper that routes every connection through a proxy.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use common::errors::{AppError, AppResult};
use common::models::{ColumnInfo, Direction, KeysetPage, OffsetPage, QueryResult};

use super::{DialerRegistry, Proxy};
use crate::database::Database;
use crate::dsn::Dsn;

/// Decorates a tunnel-capable backend so that every DSN it connects with
/// carries this tunnel's transport name.
///
/// The wrapper owns the proxy: closing it closes the backend, then the
/// proxy, then withdraws the transport name.
pub struct ProxyTunnel {
    inner: Box<dyn Database>,
    proxy: Arc<dyn Proxy>,
    dialers: Arc<DialerRegistry>,
    transport: String,
    /// Last DSN handed to the backend, transport included.
    dsn: Mutex<Option<Dsn>>,
}

impl ProxyTunnel {
    /// Publishes `proxy` under a fresh transport name and wraps `inner`.
    pub fn new(inner: Box<dyn Database>, proxy: Arc<dyn Proxy>, dialers: Arc<DialerRegistry>) -> Self {
        let transport = dialers.register(proxy.clone());
        Self {
            inner,
            proxy,
            dialers,
            transport,
            dsn: Mutex::new(None),
        }
    }

    /// Transport name this tunnel is registered under.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    async fn connect_with(&self, dsn: Dsn) -> AppResult<()> {
        let dsn = dsn.with_transport(&self.transport);
        self.inner.connect(&dsn.to_string()).await?;
        *self.dsn.lock() = Some(dsn);
        Ok(())
    }
}

#[async_trait]
impl Database for ProxyTunnel {
    async fn connect(&self, dsn: &str) -> AppResult<()> {
        self.connect_with(Dsn::parse(dsn)?).await
    }

    async fn close(&self) -> AppResult<()> {
        let mut failures = Vec::new();
        if let Err(e) = self.inner.close().await {
            failures.push(format!("backend: {}", e));
        }
        if let Err(e) = self.proxy.close().await {
            failures.push(format!("proxy: {}", e));
        }
        self.dialers.unregister(&self.transport);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::CloseFailed(failures.join("; ")))
        }
    }

    async fn get_tables(&self) -> AppResult<Vec<String>> {
        self.inner.get_tables().await
    }

    async fn get_table_schema(&self, table: &str) -> AppResult<String> {
        self.inner.get_table_schema(table).await
    }

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        self.inner.get_table_columns(table).await
    }

    async fn get_databases(&self) -> AppResult<Vec<String>> {
        self.inner.get_databases().await
    }

    /// Reconnects with the new database over the same transport. The
    /// backend's own switch is bypassed so it can never dial directly.
    async fn switch_database(&self, name: &str) -> AppResult<()> {
        let mut dsn = self
            .dsn
            .lock()
            .clone()
            .ok_or_else(|| AppError::SwitchDatabaseFailed("tunnel is not connected".into()))?;
        dsn.set_database(name);
        self.connect_with(dsn)
            .await
            .map_err(|e| AppError::SwitchDatabaseFailed(format!("{}: {}", name, e)))
    }

    async fn execute_query(&self, sql: &str) -> AppResult<QueryResult> {
        self.inner.execute_query(sql).await
    }

    async fn execute_update(&self, sql: &str) -> AppResult<u64> {
        self.inner.execute_update(sql).await
    }

    async fn execute_delete(&self, sql: &str) -> AppResult<u64> {
        self.inner.execute_delete(sql).await
    }

    async fn execute_insert(&self, sql: &str) -> AppResult<u64> {
        self.inner.execute_insert(sql).await
    }

    async fn get_table_data(&self, table: &str, page: u32, page_size: u32) -> AppResult<OffsetPage> {
        self.inner.get_table_data(table, page, page_size).await
    }

    async fn get_table_data_by_id(
        &self,
        table: &str,
        primary_key: &str,
        last_id: Option<i64>,
        page_size: u32,
        direction: Direction,
    ) -> AppResult<KeysetPage> {
        self.inner
            .get_table_data_by_id(table, primary_key, last_id, page_size, direction)
            .await
    }

    async fn get_page_id_by_page_number(
        &self,
        table: &str,
        primary_key: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Option<i64>> {
        self.inner
            .get_page_id_by_page_number(table, primary_key, page, page_size)
            .await
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    fn display_name(&self) -> &'static str {
        self.inner.display_name()
    }
}
