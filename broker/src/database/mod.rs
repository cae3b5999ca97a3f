//! Database capability.
//!
//! One implementation per engine, selected by a string tag through the
//! [`DatabaseRegistry`]. Handles are shared between concurrent requests of
//! the same session, so every method takes `&self` and implementations keep
//! their connection state behind interior locks.

mod mysql;
mod registry;
mod rows;
mod sqlite;

use async_trait::async_trait;

use common::errors::AppResult;
use common::models::table::Row;
use common::models::{ColumnInfo, Direction, KeysetPage, OffsetPage, QueryResult};

use crate::pagination::key_of;

pub use mysql::{MySqlDatabase, MySqlFactory};
pub use registry::{BackendOptions, DatabaseRegistry};
pub use sqlite::{SqliteDatabase, SqliteFactory};

/// Backend engine operations consumed by the broker.
#[async_trait]
pub trait Database: Send + Sync {
    /// Connects using the DSN. Calling it on a connected handle replaces the
    /// underlying connection.
    async fn connect(&self, dsn: &str) -> AppResult<()>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&self) -> AppResult<()>;

    /// Lists tables of the current database.
    async fn get_tables(&self) -> AppResult<Vec<String>>;

    /// Returns the table definition (DDL).
    async fn get_table_schema(&self, table: &str) -> AppResult<String>;

    /// Returns column metadata, including key roles.
    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>>;

    /// Lists databases visible to the connection.
    async fn get_databases(&self) -> AppResult<Vec<String>>;

    /// Makes `name` the current database.
    async fn switch_database(&self, name: &str) -> AppResult<()>;

    /// Runs a row-returning statement.
    async fn execute_query(&self, sql: &str) -> AppResult<QueryResult>;

    /// Runs an UPDATE, returning affected rows.
    async fn execute_update(&self, sql: &str) -> AppResult<u64>;

    /// Runs a DELETE, returning affected rows.
    async fn execute_delete(&self, sql: &str) -> AppResult<u64>;

    /// Runs an INSERT, returning affected rows.
    async fn execute_insert(&self, sql: &str) -> AppResult<u64>;

    /// Offset read of one page (1-based).
    async fn get_table_data(&self, table: &str, page: u32, page_size: u32) -> AppResult<OffsetPage>;

    /// Keyset read.
    ///
    /// `Next` returns keys greater than `last_id` (from the start when
    /// absent). `Prev` returns the `page_size` keys ending at `last_id`,
    /// inclusive. Rows always come back in ascending key order.
    async fn get_table_data_by_id(
        &self,
        table: &str,
        primary_key: &str,
        last_id: Option<i64>,
        page_size: u32,
        direction: Direction,
    ) -> AppResult<KeysetPage>;

    /// Returns the keyset cursor that resumes iteration at `page`: the key of
    /// the last row of the previous page, or `None` for the first page.
    async fn get_page_id_by_page_number(
        &self,
        table: &str,
        primary_key: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Option<i64>>;

    /// Engine tag.
    fn type_name(&self) -> &'static str;

    /// Human readable engine name.
    fn display_name(&self) -> &'static str;
}

/// Builds fresh, unconnected handles for one engine family.
pub trait DatabaseFactory: Send + Sync {
    /// Creates an unconnected handle.
    fn create(&self) -> Box<dyn Database>;

    /// Whether the engine can dial through a named transport, which is what
    /// proxy tunneling requires.
    fn supports_proxy_tunnel(&self) -> bool {
        false
    }
}

impl<F> DatabaseFactory for F
where
    F: Fn() -> Box<dyn Database> + Send + Sync,
{
    fn create(&self) -> Box<dyn Database> {
        self()
    }
}

/// Turns a probed keyset fetch of up to `page_size + 1` rows into a page.
///
/// `fetched` is in travel order: ascending for `Next`, descending for `Prev`.
/// The extra row, when present, proves there is more data and yields the
/// cursor for the following request.
pub fn assemble_keyset(
    mut fetched: Vec<Row>,
    primary_key: &str,
    page_size: u32,
    direction: Direction,
    total: u64,
) -> KeysetPage {
    let page_size = page_size as usize;
    let probe = if fetched.len() > page_size {
        fetched.truncate(page_size + 1);
        fetched.pop()
    } else {
        None
    };

    let next_id = match direction {
        Direction::Next => probe
            .as_ref()
            .and_then(|_| fetched.last())
            .and_then(|row| key_of(row, primary_key)),
        Direction::Prev => probe.as_ref().and_then(|row| key_of(row, primary_key)),
    };
    if direction == Direction::Prev {
        fetched.reverse();
    }

    KeysetPage {
        rows: fetched,
        total,
        next_id,
        probed: true,
    }
}

/// Quotes an identifier with the given quote character, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{}{}", quote, quote));
    format!("{}{}{}", quote, escaped, quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), id.into());
        r
    }

    #[test]
    fn test_assemble_next_with_probe() {
        let page = assemble_keyset(vec![row(1), row(2), row(3)], "id", 2, Direction::Next, 4);
        let ids: Vec<_> = page.rows.iter().map(|r| key_of(r, "id").unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(page.next_id, Some(2));
        assert!(page.probed);
    }

    #[test]
    fn test_assemble_next_exhausted() {
        let page = assemble_keyset(vec![row(3), row(4)], "id", 2, Direction::Next, 4);
        assert_eq!(page.next_id, None);
        assert_eq!(page.rows.len(), 2);
    }

    #[test]
    fn test_assemble_prev_is_ascending() {
        let page = assemble_keyset(vec![row(4), row(3), row(2)], "id", 2, Direction::Prev, 4);
        let ids: Vec<_> = page.rows.iter().map(|r| key_of(r, "id").unwrap()).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(page.next_id, Some(2));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users", '`'), "`users`");
        assert_eq!(quote_ident("we`ird", '`'), "`we``ird`");
        assert_eq!(quote_ident("a\"b", '"'), "\"a\"\"b\"");
    }
}
