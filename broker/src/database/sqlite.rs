//! Built-in SQLite backend.
//!
//! Uses a single-connection sqlx pool so `sqlite::memory:` databases keep
//! their contents for the lifetime of the handle. SQLite has no network
//! transport, so it never takes part in proxy tunneling.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row as _;
use tokio::sync::RwLock;

use common::errors::{AppError, AppResult};
use common::models::{ColumnInfo, ColumnKey, Direction, KeysetPage, OffsetPage, QueryResult};

use super::registry::BackendOptions;
use super::rows::{column_names, sqlite_row};
use super::{assemble_keyset, quote_ident, Database, DatabaseFactory};

/// SQLite handle.
pub struct SqliteDatabase {
    options: BackendOptions,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteDatabase {
    /// Creates an unconnected handle.
    pub fn new(options: BackendOptions) -> Self {
        Self {
            options,
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> AppResult<SqlitePool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::ConnectFailed("sqlite: not connected".into()))
    }

    async fn count(&self, pool: &SqlitePool, table: &str) -> AppResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table, '"'));
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

#[async_trait]
impl Database for SqliteDatabase {
    async fn connect(&self, dsn: &str) -> AppResult<()> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| AppError::ConnectFailed(format!("sqlite: {}", e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(self.options.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| AppError::ConnectFailed(format!("sqlite: {}", e)))?;

        if let Some(old) = self.pool.write().await.replace(pool) {
            old.close().await;
        }
        tracing::debug!("SQLite handle connected");
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn get_tables(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| AppError::query("list tables", e))
    }

    async fn get_table_schema(&self, table: &str) -> AppResult<String> {
        let pool = self.pool().await?;
        let ddl: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&pool)
                .await
                .map_err(|e| AppError::query("table schema", e))?;
        ddl.ok_or_else(|| AppError::query("table schema", format!("table {} not found", table)))
    }

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        let pool = self.pool().await?;
        let sql = format!("PRAGMA table_info({})", quote_ident(table, '"'));
        let rows = sqlx::query(&sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("table columns", e))?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.try_get::<String, _>("name").unwrap_or_default(),
                data_type: row.try_get::<String, _>("type").unwrap_or_default(),
                nullable: Some(row.try_get::<i64, _>("notnull").unwrap_or(0) == 0),
                key: if row.try_get::<i64, _>("pk").unwrap_or(0) > 0 {
                    ColumnKey::Primary
                } else {
                    ColumnKey::None
                },
            })
            .collect())
    }

    async fn get_databases(&self) -> AppResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("PRAGMA database_list")
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("list databases", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect())
    }

    async fn switch_database(&self, name: &str) -> AppResult<()> {
        if name == "main" {
            return Ok(());
        }
        Err(AppError::SwitchDatabaseFailed(format!(
            "sqlite: only the main database can be selected, got {}",
            name
        )))
    }

    async fn execute_query(&self, sql: &str) -> AppResult<QueryResult> {
        let pool = self.pool().await?;
        let rows = sqlx::query(sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("query", e))?;
        Ok(QueryResult::rows(
            column_names(&rows),
            rows.iter().map(sqlite_row).collect(),
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
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let sql = format!("SELECT * FROM {} LIMIT ? OFFSET ?", quote_ident(table, '"'));
        let rows = sqlx::query(&sql)
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::query("table data", e))?;
        Ok(OffsetPage {
            rows: rows.iter().map(sqlite_row).collect(),
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
        let table_q = quote_ident(table, '"');
        let pk_q = quote_ident(primary_key, '"');
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
            .bind(i64::from(page_size) + 1)
            .fetch_all(&pool)
            .await
            .map_err(|e| AppError::PaginationUnsupported(format!("sqlite keyset read: {}", e)))?;

        Ok(assemble_keyset(
            rows.iter().map(sqlite_row).collect(),
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
        let pk_q = quote_ident(primary_key, '"');
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} ASC LIMIT 1 OFFSET ?",
            pk_q,
            quote_ident(table, '"'),
            pk_q
        );
        let offset = i64::from(page - 1) * i64::from(page_size) - 1;
        let id: Option<i64> = sqlx::query_scalar(&sql)
            .bind(offset)
            .fetch_optional(&pool)
            .await
            .map_err(|e| AppError::PaginationUnsupported(format!("sqlite page id: {}", e)))?;
        id.map(Some)
            .ok_or_else(|| AppError::Validation(format!("page {} is out of range", page)))
    }

    fn type_name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }
}

/// Factory for [`SqliteDatabase`].
pub struct SqliteFactory {
    options: BackendOptions,
}

impl SqliteFactory {
    /// Creates the factory.
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }
}

impl DatabaseFactory for SqliteFactory {
    fn create(&self) -> Box<dyn Database> {
        Box::new(SqliteDatabase::new(self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn users() -> SqliteDatabase {
        let db = SqliteDatabase::new(BackendOptions::default());
        db.connect("sqlite::memory:").await.unwrap();
        db.execute_update("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await
            .unwrap();
        for (id, name) in [(1, "ann"), (2, "bob"), (3, "cid"), (4, "dee")] {
            db.execute_insert(&format!("INSERT INTO users (id, name) VALUES ({}, '{}')", id, name))
                .await
                .unwrap();
        }
        db
    }

    fn ids(rows: &[common::models::table::Row]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_metadata() {
        let db = users().await;
        assert_eq!(db.get_tables().await.unwrap(), vec!["users".to_string()]);
        assert!(db.get_table_schema("users").await.unwrap().contains("CREATE TABLE users"));
        assert_eq!(db.get_databases().await.unwrap(), vec!["main".to_string()]);

        let cols = db.get_table_columns("users").await.unwrap();
        assert_eq!(cols.len(), 2);
        assert!(cols[0].is_primary());
        assert_eq!(cols[0].data_type, "INTEGER");
        assert!(!cols[1].is_primary());
        assert_eq!(cols[1].nullable, Some(false));
    }

    #[tokio::test]
    async fn test_offset_read() {
        let db = users().await;
        let page = db.get_table_data("users", 2, 3).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(ids(&page.rows), vec![4]);
    }

    #[tokio::test]
    async fn test_keyset_next_then_prev_round_trip() {
        let db = users().await;
        let first = db
            .get_table_data_by_id("users", "id", Some(1), 2, Direction::Next)
            .await
            .unwrap();
        assert_eq!(ids(&first.rows), vec![2, 3]);
        assert_eq!(first.next_id, Some(3));

        let back = db
            .get_table_data_by_id("users", "id", first.next_id, 2, Direction::Prev)
            .await
            .unwrap();
        assert_eq!(ids(&back.rows), vec![2, 3]);
        assert_eq!(back.next_id, Some(1));
    }

    #[tokio::test]
    async fn test_page_id() {
        let db = users().await;
        assert_eq!(db.get_page_id_by_page_number("users", "id", 1, 2).await.unwrap(), None);
        assert_eq!(db.get_page_id_by_page_number("users", "id", 2, 2).await.unwrap(), Some(2));
        assert!(db.get_page_id_by_page_number("users", "id", 5, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_switch_database() {
        let db = users().await;
        assert!(db.switch_database("main").await.is_ok());
        assert!(matches!(
            db.switch_database("other").await,
            Err(AppError::SwitchDatabaseFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_query_rows() {
        let db = users().await;
        let result = db
            .execute_query("SELECT id, name FROM users WHERE id = 2")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["name"], "bob");
        assert_eq!(db.execute_delete("DELETE FROM users WHERE id > 2").await.unwrap(), 2);
    }
}
