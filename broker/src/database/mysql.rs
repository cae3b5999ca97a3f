//! Built-in MySQL / MariaDB backend.
//!
//! The backend understands the `transport` DSN parameter: when present the
//! named dialer is looked up in the [`DialerRegistry`] and a loopback
//! forwarder is started in front of it, so the sqlx pool reaches the target
//! through the tunnel while the DSN keeps the original address.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row as _;
use tokio::sync::RwLock;

use common::errors::{AppError, AppResult};
use common::models::{ColumnInfo, ColumnKey, Direction, KeysetPage, OffsetPage, QueryResult};

use super::registry::BackendOptions;
use super::rows::{column_names, mysql_row};
use super::{assemble_keyset, quote_ident, Database, DatabaseFactory};
use crate::dsn::{Dsn, TRANSPORT_PARAM};
use crate::proxy::{DialerRegistry, LocalForwarder};

struct Connected {
    pool: MySqlPool,
    /// DSN as given to `connect`, transport parameter included.
    dsn: Dsn,
    forwarder: Option<LocalForwarder>,
}

impl Connected {
    async fn shutdown(self) {
        self.pool.close().await;
        if let Some(forwarder) = self.forwarder {
            forwarder.close();
        }
    }
}

/// MySQL handle.
pub struct MySqlDatabase {
    dialers: Arc<DialerRegistry>,
    options: BackendOptions,
    state: RwLock<Option<Connected>>,
}

impl MySqlDatabase {
    /// Creates an unconnected handle.
    pub fn new(dialers: Arc<DialerRegistry>, options: BackendOptions) -> Self {
        Self {
            dialers,
            options,
            state: RwLock::new(None),
        }
    }

    async fn pool(&self) -> AppResult<MySqlPool> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.pool.clone())
            .ok_or_else(|| AppError::ConnectFailed("mysql: not connected".into()))
    }

    /// Resolves the DSN sqlx should dial, starting a forwarder for tunneled
    /// targets.
    async fn effective_dsn(&self, dsn: &Dsn) -> AppResult<(Dsn, Option<LocalForwarder>)> {
        let mut effective = dsn.clone();
        if effective.scheme() != "mysql" {
            effective.set_scheme("mysql")?;
        }

        let Some(transport) = dsn.transport() else {
            return Ok((effective, None));
        };
        let proxy = self.dialers.resolve(&transport).ok_or_else(|| {
            AppError::ConnectFailed(format!("mysql: unknown transport {}", transport))
        })?;
        let target = dsn
            .address()
            .ok_or_else(|| AppError::ConnectFailed("mysql: tunneled dsn has no address".into()))?;

        let forwarder = LocalForwarder::start(proxy, target.clone()).await?;
        let local = forwarder.local_addr();
        effective.set_address(&local.ip().to_string(), local.port())?;
        effective.remove_param(TRANSPORT_PARAM);
        tracing::debug!(transport = %transport, target = %target, local = %local, "MySQL dialing through tunnel");
        Ok((effective, Some(forwarder)))
    }

    async fn count(&self, pool: &MySqlPool, table: &str) -> AppResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table, '`'));
        let total: i64 = sqlx::query_scalar(&sql)
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::query("count", e))?;
        Ok(total.max(0) as u64)
    }

    async fn execute(&self, verb: &str, sql: &str) -> AppResult<u64> {
        let pool = self.pool().await?;
        let result = sqlx::query(sql)
            .execute(&pool)
            .await
            .map_err(|e| AppError::query(verb, e))?;
        Ok(result.rows_affected())
    }
}

/// Reads a text column that some server versions report as binary.
fn text(row: &MySqlRow, idx: usize) -> String {
    row.try_get::<String, _>(idx)
        .or_else(|_| {
            row.try_get::<Vec<u8>, _>(idx)
                .map(|b| String::from_utf8_lossy(&b).into_owned())
        })
        .unwrap_or_default()
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn connect(&self, dsn: &str) -> AppResult<()> {
        let dsn = Dsn::parse(dsn)?;
        let (effective, forwarder) = self.effective_dsn(&dsn).await?;

        let pool = match MySqlPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.connect_timeout)
            .connect(&effective.to_string())
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                if let Some(forwarder) = forwarder {
                    forwarder.close();
                }
                return Err(AppError::ConnectFailed(format!("mysql: {}", e)));
            }
        };

        let previous = self.state.write().await.replace(Connected {
            pool,
            dsn,
            forwarder,
        });
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        tracing::debug!("MySQL handle connected");
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        if let Some(state) = self.state.write().await.take() {
            state.shutdown().await;
        }
        Ok(())
    }

    async fn get_tables(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SHOW TABLES")
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("list tables", e))?;
        Ok(rows.iter().map(|r| text(r, 0)).collect())
    }

    async fn get_table_schema(&self, table: &str) -> AppResult<String> {
        let pool = self.pool().await?;
        let sql = format!("SHOW CREATE TABLE {}", quote_ident(table, '`'));
        let row = sqlx::query(&sql)
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::query("table schema", e))?;
        Ok(text(&row, 1))
    }

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        let pool = self.pool().await?;
        let sql = format!("SHOW COLUMNS FROM {}", quote_ident(table, '`'));
        let rows = sqlx::query(&sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("table columns", e))?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: text(row, 0),
                data_type: text(row, 1),
                nullable: Some(text(row, 2).eq_ignore_ascii_case("YES")),
                key: if text(row, 3) == "PRI" {
                    ColumnKey::Primary
                } else {
                    ColumnKey::None
                },
            })
            .collect())
    }

    async fn get_databases(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SHOW DATABASES")
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("list databases", e))?;
        Ok(rows.iter().map(|r| text(r, 0)).collect())
    }

    async fn switch_database(&self, name: &str) -> AppResult<()> {
        let mut dsn = self
            .state
            .read()
            .await
            .as_ref()
            .map(|s| s.dsn.clone())
            .ok_or_else(|| AppError::SwitchDatabaseFailed("mysql: not connected".into()))?;
        dsn.set_database(name);
        self.connect(&dsn.to_string())
            .await
            .map_err(|e| AppError::SwitchDatabaseFailed(format!("{}: {}", name, e)))
    }

    async fn execute_query(&self, sql: &str) -> AppResult<QueryResult> {
        let pool = self.pool().await?;
        let rows = sqlx::query(sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("query", e))?;
        Ok(QueryResult::rows(
            column_names(&rows),
            rows.iter().map(mysql_row).collect(),
        ))
    }

    async fn execute_update(&self, sql: &str) -> AppResult<u64> {
        self.execute("update", sql).await
    }

    async fn execute_delete(&self, sql: &str) -> AppResult<u64> {
        self.execute("delete", sql).await
    }

    async fn execute_insert(&self, sql: &str) -> AppResult<u64> {
        self.execute("insert", sql).await
    }

    async fn get_table_data(&self, table: &str, page: u32, page_size: u32) -> AppResult<OffsetPage> {
        let pool = self.pool().await?;
        let total = self.count(&pool, table).await?;
        let offset = u64::from(page.max(1) - 1) * u64::from(page_size);
        let sql = format!("SELECT * FROM {} LIMIT ? OFFSET ?", quote_ident(table, '`'));
        let rows = sqlx::query(&sql)
            .bind(u64::from(page_size))
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("table data", e))?;
        Ok(OffsetPage {
            rows: rows.iter().map(mysql_row).collect(),
            total,
        })
    }

    async fn get_table_data_by_id(
        &self,
        table: &str,
        primary_key: &str,
        last_id: Option<i64>,
        page_size: u32,
        direction: Direction,
    ) -> AppResult<KeysetPage> {
        let pool = self.pool().await?;
        let total = self.count(&pool, table).await?;
        let table_q = quote_ident(table, '`');
        let pk_q = quote_ident(primary_key, '`');
        let (filter, order) = match direction {
            Direction::Next => (format!("{} > ?", pk_q), "ASC"),
            Direction::Prev => (format!("{} <= ?", pk_q), "DESC"),
        };
        let sql = match last_id {
            Some(_) => format!(
                "SELECT * FROM {} WHERE {} ORDER BY {} {} LIMIT ?",
                table_q, filter, pk_q, order
            ),
            None => format!("SELECT * FROM {} ORDER BY {} {} LIMIT ?", table_q, pk_q, order),
        };

        let mut query = sqlx::query(&sql);
        if let Some(id) = last_id {
            query = query.bind(id);
        }
        let rows = query
            .bind(u64::from(page_size) + 1)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::PaginationUnsupported(format!("mysql keyset read: {}", e)))?;

        Ok(assemble_keyset(
            rows.iter().map(mysql_row).collect(),
            primary_key,
            page_size,
            direction,
            total,
        ))
    }

    async fn get_page_id_by_page_number(
        &self,
        table: &str,
        primary_key: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Option<i64>> {
        if page <= 1 || page_size == 0 {
            return Ok(None);
        }
        let pool = self.pool().await?;
        let pk_q = quote_ident(primary_key, '`');
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} ASC LIMIT 1 OFFSET ?",
            pk_q,
            quote_ident(table, '`'),
            pk_q
        );
        let offset = u64::from(page - 1) * u64::from(page_size) - 1;
        let row = sqlx::query(&sql)
            .bind(offset)
            .fetch_optional(&pool)
            .await
            .map_err(|e| AppError::PaginationUnsupported(format!("mysql page id: {}", e)))?;

        let row = row.ok_or_else(|| AppError::Validation(format!("page {} is out of range", page)))?;
        let id = row
            .try_get::<i64, _>(0)
            .or_else(|_| row.try_get::<u64, _>(0).map(|v| v as i64))
            .map_err(|e| AppError::PaginationUnsupported(format!("mysql page id: {}", e)))?;
        Ok(Some(id))
    }

    fn type_name(&self) -> &'static str {
        "mysql"
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }
}

/// Factory for [`MySqlDatabase`]. Tunnel capable.
pub struct MySqlFactory {
    dialers: Arc<DialerRegistry>,
    options: BackendOptions,
}

impl MySqlFactory {
    /// Creates the factory; handles resolve transports through `dialers`.
    pub fn new(dialers: Arc<DialerRegistry>, options: BackendOptions) -> Self {
        Self { dialers, options }
    }
}

impl DatabaseFactory for MySqlFactory {
    fn create(&self) -> Box<dyn Database> {
        Box::new(MySqlDatabase::new(self.dialers.clone(), self.options))
    }

    fn supports_proxy_tunnel(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_connected() {
        let db = MySqlDatabase::new(Arc::new(DialerRegistry::new()), BackendOptions::default());
        assert!(matches!(db.get_tables().await, Err(AppError::ConnectFailed(_))));
        assert!(matches!(
            db.switch_database("shop").await,
            Err(AppError::SwitchDatabaseFailed(_))
        ));
        assert!(db.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_transport_is_rejected() {
        let db = MySqlDatabase::new(Arc::new(DialerRegistry::new()), BackendOptions::default());
        let err = db
            .connect("mysql://root@db.internal:3306/shop?transport=tun404")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConnectFailed(m) if m.contains("tun404")));
    }

    #[test]
    fn test_factory_is_tunnel_capable() {
        let factory = MySqlFactory::new(Arc::new(DialerRegistry::new()), BackendOptions::default());
        assert!(factory.supports_proxy_tunnel());
        assert_eq!(factory.create().type_name(), "mysql");
    }
}
