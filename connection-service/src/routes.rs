//! 连接服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// 创建会话代理路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/connect", post(handlers::connect))
        .route("/api/disconnect", post(handlers::disconnect))
        .route("/api/session", get(handlers::session_info))
        .route("/api/databases", get(handlers::list_databases))
        .route("/api/databases/switch", post(handlers::switch_database))
        .route("/api/tables", get(handlers::list_tables))
        .route("/api/tables/switch", post(handlers::switch_table))
        .route("/api/tables/{table}/schema", get(handlers::table_schema))
        .route("/api/tables/{table}/columns", get(handlers::table_columns))
        .route("/api/tables/{table}/data", get(handlers::table_data))
        .route("/api/tables/{table}/page-id", get(handlers::page_id))
        .route("/api/query", post(handlers::execute_query))
        .route("/api/health", get(handlers::health_check))
}
