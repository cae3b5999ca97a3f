//! Error taxonomy shared by the broker and the HTTP surface.
//!
//! Every fallible operation returns [`AppResult`]. The HTTP layer converts
//! an [`AppError`] into the standard [`ApiResponse`] failure payload:
//! 4xx for input and policy violations, 5xx for backend and internal failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// No live session record for the connection ID (missing or expired).
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// No backend factory registered for the type tag.
    #[error("unsupported database type: {0}")]
    UnsupportedDatabaseType(String),

    /// No proxy factory registered for the type tag.
    #[error("unsupported proxy type: {0}")]
    UnsupportedProxyType(String),

    /// The proxy handshake or a dial through it failed.
    #[error("failed to establish proxy: {0}")]
    ProxyEstablishFailed(String),

    /// Connecting the backend failed.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    /// Switching the current database failed.
    #[error("failed to switch database: {0}")]
    SwitchDatabaseFailed(String),

    /// A SQL validator rejected the statement.
    #[error("validation failed [{validator}]: {message}")]
    ValidationFailed { validator: String, message: String },

    /// The statement is not one of SELECT/UPDATE/DELETE/INSERT.
    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(String),

    /// Executing a statement failed.
    #[error("{verb} failed: {message}")]
    QueryExecutionFailed { verb: String, message: String },

    /// Keyset pagination is not possible for the table.
    #[error("id pagination unsupported: {0}")]
    PaginationUnsupported(String),

    /// Rebuilding a session handle from its persisted record failed.
    #[error("failed to rebuild session: {0}")]
    RebuildFailed(String),

    /// Closing one or more resources failed.
    #[error("failed to close: {0}")]
    CloseFailed(String),

    /// Session store operation failed.
    #[error("session store error: {0}")]
    SessionStore(String),

    /// Request input is invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection ID header / query parameter is missing.
    #[error("missing connection id")]
    MissingConnectionId,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            AppError::UnsupportedDatabaseType(_) => "UNSUPPORTED_DATABASE_TYPE",
            AppError::UnsupportedProxyType(_) => "UNSUPPORTED_PROXY_TYPE",
            AppError::ProxyEstablishFailed(_) => "PROXY_ESTABLISH_FAILED",
            AppError::ConnectFailed(_) => "CONNECT_FAILED",
            AppError::SwitchDatabaseFailed(_) => "SWITCH_DATABASE_FAILED",
            AppError::ValidationFailed { .. } => "VALIDATION_FAILED",
            AppError::UnsupportedQueryType(_) => "UNSUPPORTED_QUERY_TYPE",
            AppError::QueryExecutionFailed { .. } => "QUERY_EXECUTION_FAILED",
            AppError::PaginationUnsupported(_) => "PAGINATION_UNSUPPORTED",
            AppError::RebuildFailed(_) => "REBUILD_FAILED",
            AppError::CloseFailed(_) => "CLOSE_FAILED",
            AppError::SessionStore(_) => "SESSION_STORE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::MissingConnectionId => "MISSING_CONNECTION_ID",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedDatabaseType(_)
            | AppError::UnsupportedProxyType(_)
            | AppError::ValidationFailed { .. }
            | AppError::UnsupportedQueryType(_)
            | AppError::Validation(_)
            | AppError::MissingConnectionId => StatusCode::BAD_REQUEST,
            AppError::ProxyEstablishFailed(_)
            | AppError::ConnectFailed(_)
            | AppError::SwitchDatabaseFailed(_)
            | AppError::RebuildFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::QueryExecutionFailed { .. }
            | AppError::PaginationUnsupported(_)
            | AppError::CloseFailed(_)
            | AppError::SessionStore(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a query failure tagged with its verb.
    pub fn query(verb: &str, err: impl std::fmt::Display) -> Self {
        AppError::QueryExecutionFailed {
            verb: verb.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SessionStore(format!("serialization: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::ConnectionNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ValidationFailed {
                validator: "require_limit".into(),
                message: "missing LIMIT".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(AppError::RebuildFailed("boom".into())
            .status_code()
            .is_server_error());
    }

    #[test]
    fn test_validation_failed_message_carries_validator_name() {
        let err = AppError::ValidationFailed {
            validator: "forbid_truncate".into(),
            message: "TRUNCATE is not allowed".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation failed [forbid_truncate]: TRUNCATE is not allowed"
        );
    }
}
