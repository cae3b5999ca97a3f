//! Request middleware and extractors shared by the HTTP surface.

pub mod connection_id;
pub mod request_id;

pub use connection_id::{ConnectionId, CONNECTION_ID_HEADER, CONNECTION_ID_QUERY};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
