//! Table metadata and paginated table reads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Key role of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKey {
    /// Part of the primary key.
    Primary,
    /// No key role.
    #[default]
    None,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type string as reported by the engine.
    pub data_type: String,
    /// Whether the column is nullable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Key role.
    #[serde(default)]
    pub key: ColumnKey,
}

impl ColumnInfo {
    /// Creates a non-key column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: None,
            key: ColumnKey::None,
        }
    }

    /// Marks the column as (part of) the primary key.
    pub fn primary(mut self) -> Self {
        self.key = ColumnKey::Primary;
        self
    }

    /// Whether the column is part of the primary key.
    pub fn is_primary(&self) -> bool {
        self.key == ColumnKey::Primary
    }
}

/// Keyset travel direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Keys after the cursor.
    #[default]
    Next,
    /// The page ending at the cursor.
    Prev,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Next => write!(f, "next"),
            Direction::Prev => write!(f, "prev"),
        }
    }
}

/// Request for one page of table data.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDataRequest {
    /// Table name.
    pub table: String,
    /// Page number (1-based).
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
    /// Keyset cursor.
    pub last_id: Option<i64>,
    /// Keyset direction.
    pub direction: Direction,
}

impl TableDataRequest {
    /// First page of a table.
    pub fn first_page(table: impl Into<String>, page_size: u32) -> Self {
        Self {
            table: table.into(),
            page: 1,
            page_size,
            last_id: None,
            direction: Direction::Next,
        }
    }

    /// Continues from a keyset cursor.
    pub fn after(mut self, last_id: i64, direction: Direction) -> Self {
        self.last_id = Some(last_id);
        self.direction = direction;
        self
    }
}

/// Offset read result returned by a backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OffsetPage {
    /// Rows of the page.
    pub rows: Vec<Row>,
    /// Total rows in the table.
    pub total: u64,
}

/// Keyset read result returned by a backend.
///
/// Rows are always in ascending key order. When `probed` is set the backend
/// looked past the page boundary and `next_id` is authoritative: `None`
/// means there is nothing further in the travel direction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeysetPage {
    /// Rows of the page.
    pub rows: Vec<Row>,
    /// Total rows in the table.
    pub total: u64,
    /// Cursor for the next request in the same direction.
    pub next_id: Option<i64>,
    /// Whether `next_id` is explicit.
    pub probed: bool,
}

/// Page of table data returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TableData {
    /// Column metadata.
    pub columns: Vec<ColumnInfo>,
    /// Rows in ascending key order.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,
    /// Total rows in the table.
    pub total: u64,
    /// Page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
    /// Total number of pages.
    pub total_pages: u32,
    /// Whether keyset pagination served this page.
    pub use_id_pagination: bool,
    /// Key column used for keyset pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Direction of travel for keyset pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Cursor for the following request in the same direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_id: Option<i64>,
    /// Whether another page exists in the direction of travel.
    pub has_next_page: bool,
}
