//! Session records.
//!
//! [`SessionData`] is the authoritative, persisted state of one logical
//! connection. It is the only thing separate requests and processes agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::connection::ConnectionInfo;

/// Persisted session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Target the session was opened with.
    pub connection_info: ConnectionInfo,
    /// DSN the handle was built from.
    pub dsn: String,
    /// Engine type tag.
    pub db_type: String,
    /// Currently selected database.
    #[serde(default)]
    pub current_database: Option<String>,
    /// Currently selected table.
    #[serde(default)]
    pub current_table: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    /// Creates a fresh record for a newly connected target.
    pub fn new(connection_info: ConnectionInfo, dsn: String) -> Self {
        Self {
            db_type: connection_info.type_tag(),
            current_database: connection_info.database.clone(),
            current_table: None,
            connection_info,
            dsn,
            created_at: Utc::now(),
        }
    }
}

/// Public view of a session (no credentials).
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionInfo {
    /// Connection ID.
    pub connection_id: String,
    /// Engine type tag.
    pub db_type: String,
    /// Engine display name.
    pub display_name: String,
    /// Currently selected database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_database: Option<String>,
    /// Currently selected table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_table: Option<String>,
    /// Whether the session is tunneled through a proxy.
    pub proxied: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
