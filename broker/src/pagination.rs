//! Pagination planner.
//!
//! Chooses between keyset and offset reads for one page of table data and
//! derives the continuation cursor. Keyset reads are used whenever the table
//! has a single integer primary key; any keyset failure degrades to an
//! offset read for that request.

use common::errors::{AppError, AppResult};
use common::models::table::Row;
use common::models::{ColumnInfo, Direction, KeysetPage, TableData, TableDataRequest};
use common::response::Pagination;

use crate::database::Database;

const INTEGER_MARKERS: [&str; 6] = ["int", "serial", "bigint", "smallint", "tinyint", "mediumint"];

/// Integer key value of `primary_key` in `row`.
pub fn key_of(row: &Row, primary_key: &str) -> Option<i64> {
    match row.get(primary_key)? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether a declared column type is an integer family type.
pub fn is_integer_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    INTEGER_MARKERS.iter().any(|m| lower.contains(m))
}

/// The column keyset pagination can run on: the only primary key column,
/// when it is an integer.
pub fn keyset_column(columns: &[ColumnInfo]) -> Option<&ColumnInfo> {
    let mut primaries = columns.iter().filter(|c| c.is_primary());
    match (primaries.next(), primaries.next()) {
        (Some(pk), None) if is_integer_type(&pk.data_type) => Some(pk),
        _ => None,
    }
}

/// Reads one page of `request.table` from `db`.
pub async fn read_page(db: &dyn Database, request: &TableDataRequest) -> AppResult<TableData> {
    if request.page == 0 {
        return Err(AppError::Validation("page must be at least 1".into()));
    }
    if request.page_size == 0 {
        return Err(AppError::Validation("page_size must be at least 1".into()));
    }

    let columns = db.get_table_columns(&request.table).await?;
    if let Some(pk) = keyset_column(&columns).map(|c| c.name.clone()) {
        match read_keyset(db, request, &pk).await {
            Ok(page) => return Ok(keyset_data(columns, request, pk, page)),
            Err(e) => {
                tracing::warn!(
                    table = %request.table,
                    primary_key = %pk,
                    error = %e,
                    "Keyset read failed, falling back to offset pagination"
                );
            }
        }
    }

    let page = db
        .get_table_data(&request.table, request.page, request.page_size)
        .await?;
    let pagination = Pagination::new(request.page, request.page_size, page.total);
    Ok(TableData {
        columns,
        rows: page.rows,
        total: page.total,
        page: request.page,
        page_size: request.page_size,
        total_pages: pagination.total_pages,
        use_id_pagination: false,
        primary_key: None,
        direction: None,
        next_id: None,
        has_next_page: pagination.has_next,
    })
}

async fn read_keyset(
    db: &dyn Database,
    request: &TableDataRequest,
    primary_key: &str,
) -> AppResult<KeysetPage> {
    let last_id = match request.last_id {
        Some(id) => Some(id),
        None if request.page > 1 => {
            db.get_page_id_by_page_number(&request.table, primary_key, request.page, request.page_size)
                .await?
        }
        None => None,
    };
    db.get_table_data_by_id(
        &request.table,
        primary_key,
        last_id,
        request.page_size,
        request.direction,
    )
    .await
}

fn keyset_data(
    columns: Vec<ColumnInfo>,
    request: &TableDataRequest,
    primary_key: String,
    page: KeysetPage,
) -> TableData {
    let next_id = if page.probed {
        page.next_id
    } else {
        let edge = match request.direction {
            Direction::Next => page.rows.last(),
            Direction::Prev => page.rows.first(),
        };
        edge.and_then(|row| key_of(row, &primary_key))
    };
    let has_next_page = page.rows.len() == request.page_size as usize && next_id.is_some();
    let pagination = Pagination::new(request.page, request.page_size, page.total);

    TableData {
        columns,
        rows: page.rows,
        total: page.total,
        page: request.page,
        page_size: request.page_size,
        total_pages: pagination.total_pages,
        use_id_pagination: true,
        primary_key: Some(primary_key),
        direction: Some(request.direction),
        next_id,
        has_next_page,
    }
}
