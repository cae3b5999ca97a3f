//! 数据库连接会话代理服务
//!
//! 提供会话式的数据库访问，包括：
//! - 建立连接（可经 SSH 隧道）并以连接 ID 标识会话
//! - 会话持久化与跨实例重建
//! - 库表浏览、主键游标分页
//! - 经校验链过滤的 SQL 执行

mod handlers;
mod routes;
mod service;
mod state;

use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig};
use common::middleware::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "connection-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "连接会话服务 API",
        version = "0.1.0",
        description = "数据库连接会话代理微服务"
    ),
    paths(
        handlers::connect,
        handlers::disconnect,
        handlers::session_info,
        handlers::list_databases,
        handlers::switch_database,
        handlers::list_tables,
        handlers::switch_table,
        handlers::table_schema,
        handlers::table_columns,
        handlers::table_data,
        handlers::page_id,
        handlers::execute_query,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectionInfo,
        common::models::ProxyConfig,
        common::models::SessionInfo,
        common::models::ColumnInfo,
        common::models::ColumnKey,
        common::models::Direction,
        common::models::TableData,
        common::models::QueryRequest,
        common::models::QueryResult,
        common::response::Pagination,
        handlers::SwitchDatabaseRequest,
        handlers::SwitchTableRequest,
        handlers::TableSchema,
        handlers::PageId,
        handlers::HealthResponse,
    )),
    tags(
        (name = "sessions", description = "会话管理端点"),
        (name = "databases", description = "数据库浏览端点"),
        (name = "tables", description = "表浏览与分页端点"),
        (name = "query", description = "SQL 执行端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 创建应用状态（会话存储 + 连接代理）
    let state = AppState::new(config.clone()).await?;
    let manager = state.manager.clone();
    info!(
        session_store = manager.store().kind(),
        database_types = ?manager.broker().database_types(),
        "会话代理已就绪"
    );

    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 关闭本实例持有的连接与会话存储客户端，已持久化的记录不删除
    if let Err(e) = manager.close().await {
        tracing::warn!(error = %e, "关闭会话时出错");
    }
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号");
}
