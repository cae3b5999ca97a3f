//! Shared data models.

pub mod connection;
pub mod query;
pub mod session;
pub mod table;

pub use connection::{ConnectionInfo, ProxyConfig};
pub use query::{QueryRequest, QueryResult};
pub use session::{SessionData, SessionInfo};
pub use table::{
    ColumnInfo, ColumnKey, Direction, KeysetPage, OffsetPage, TableData, TableDataRequest,
};
