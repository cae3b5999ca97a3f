//! Shared building blocks for the connection session broker.
//!
//! Holds the configuration loader, the error taxonomy, the unified API
//! response envelope, shared models and request middleware.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
