//! Connection ID extraction.
//!
//! Every call after the initial connect identifies its logical session by a
//! connection ID carried either in the `X-Connection-ID` header or in the
//! `connection_id` query parameter. The header wins when both are present.

use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::HeaderName, request::Parts},
};

use crate::errors::AppError;

/// Header carrying the connection ID.
pub static CONNECTION_ID_HEADER: HeaderName = HeaderName::from_static("x-connection-id");

/// Query parameter carrying the connection ID.
pub const CONNECTION_ID_QUERY: &str = "connection_id";

/// Connection ID of the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Returns the ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_parts(parts: &Parts) -> Option<Self> {
        let from_header = parts
            .headers
            .get(&CONNECTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        from_header
            .or_else(|| {
                Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                    .ok()
                    .and_then(|Query(mut params)| params.remove(CONNECTION_ID_QUERY))
                    .filter(|v| !v.trim().is_empty())
            })
            .map(ConnectionId)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S> FromRequestParts<S> for ConnectionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or(AppError::MissingConnectionId)
    }
}
