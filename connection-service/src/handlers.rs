//! Handler模块

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use common::errors::AppError;
use common::middleware::ConnectionId;
use common::models::{
    ColumnInfo, ConnectionInfo, Direction, QueryRequest, QueryResult, SessionInfo, TableData,
};
use common::response::ApiResponse;

use crate::service::{SessionService, SessionServiceTrait, TableDataParams};
use crate::state::AppState;

const SERVICE_NAME: &str = "connection-service";

fn service(state: &AppState) -> SessionService {
    SessionService::new(state.manager.clone(), state.config.default_page_size)
}

/// 建立数据库连接并创建会话
#[utoipa::path(
    post,
    path = "/api/connect",
    tag = "sessions",
    request_body = ConnectionInfo,
    responses(
        (status = 200, description = "会话已创建", body = ApiResponse<SessionInfo>),
        (status = 400, description = "参数错误或不支持的类型"),
        (status = 502, description = "连接或代理建立失败")
    )
)]
pub async fn connect(
    State(state): State<AppState>,
    Json(info): Json<ConnectionInfo>,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    let data = service(&state).connect(info).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 关闭会话
#[utoipa::path(
    post,
    path = "/api/disconnect",
    tag = "sessions",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    responses(
        (status = 200, description = "会话已关闭", body = ApiResponse<bool>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn disconnect(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
) -> Result<Json<ApiResponse<bool>>, AppError> {
    service(&state).disconnect(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(true, SERVICE_NAME)))
}

/// 获取会话信息
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "sessions",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    responses(
        (status = 200, description = "会话信息", body = ApiResponse<SessionInfo>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn session_info(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    let data = service(&state).session(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 列出数据库
#[utoipa::path(
    get,
    path = "/api/databases",
    tag = "databases",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    responses(
        (status = 200, description = "数据库列表", body = ApiResponse<Vec<String>>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let data = service(&state).databases(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 切换数据库
#[utoipa::path(
    post,
    path = "/api/databases/switch",
    tag = "databases",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    request_body = SwitchDatabaseRequest,
    responses(
        (status = 200, description = "已切换", body = ApiResponse<SessionInfo>),
        (status = 404, description = "会话未找到"),
        (status = 502, description = "切换失败")
    )
)]
pub async fn switch_database(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Json(req): Json<SwitchDatabaseRequest>,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    req.validate()?;
    let data = service(&state).switch_database(&id, &req.database).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 列出当前数据库中的表
#[utoipa::path(
    get,
    path = "/api/tables",
    tag = "tables",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    responses(
        (status = 200, description = "表列表", body = ApiResponse<Vec<String>>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let data = service(&state).tables(&id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 切换当前表
#[utoipa::path(
    post,
    path = "/api/tables/switch",
    tag = "tables",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    request_body = SwitchTableRequest,
    responses(
        (status = 200, description = "已切换", body = ApiResponse<SessionInfo>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn switch_table(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Json(req): Json<SwitchTableRequest>,
) -> Result<Json<ApiResponse<SessionInfo>>, AppError> {
    req.validate()?;
    let data = service(&state).switch_table(&id, &req.table).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 获取表结构定义
#[utoipa::path(
    get,
    path = "/api/tables/{table}/schema",
    tag = "tables",
    params(
        ("table" = String, Path, description = "表名"),
        ("X-Connection-ID" = String, Header, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "表结构", body = ApiResponse<TableSchema>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn table_schema(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Path(table): Path<String>,
) -> Result<Json<ApiResponse<TableSchema>>, AppError> {
    let schema = service(&state).table_schema(&id, &table).await?;
    Ok(Json(ApiResponse::ok_with_service(
        TableSchema { table, schema },
        SERVICE_NAME,
    )))
}

/// 获取列信息
#[utoipa::path(
    get,
    path = "/api/tables/{table}/columns",
    tag = "tables",
    params(
        ("table" = String, Path, description = "表名"),
        ("X-Connection-ID" = String, Header, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "列信息", body = ApiResponse<Vec<ColumnInfo>>),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn table_columns(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Path(table): Path<String>,
) -> Result<Json<ApiResponse<Vec<ColumnInfo>>>, AppError> {
    let data = service(&state).table_columns(&id, &table).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 分页读取表数据（优先使用主键游标分页）
#[utoipa::path(
    get,
    path = "/api/tables/{table}/data",
    tag = "tables",
    params(
        ("table" = String, Path, description = "表名"),
        ("X-Connection-ID" = String, Header, description = "连接 ID"),
        TableDataQuery
    ),
    responses(
        (status = 200, description = "表数据", body = ApiResponse<TableData>),
        (status = 400, description = "分页参数错误"),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn table_data(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Path(table): Path<String>,
    Query(query): Query<TableDataQuery>,
) -> Result<Json<ApiResponse<TableData>>, AppError> {
    let params = TableDataParams {
        table,
        page: query.page,
        page_size: query.page_size,
        last_id: query.last_id,
        direction: query.direction,
    };
    let data = service(&state).table_data(&id, params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 获取指定页的起始游标
#[utoipa::path(
    get,
    path = "/api/tables/{table}/page-id",
    tag = "tables",
    params(
        ("table" = String, Path, description = "表名"),
        ("X-Connection-ID" = String, Header, description = "连接 ID"),
        PageIdQuery
    ),
    responses(
        (status = 200, description = "页起始游标", body = ApiResponse<PageId>),
        (status = 400, description = "页码越界或表不支持游标分页"),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn page_id(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Path(table): Path<String>,
    Query(query): Query<PageIdQuery>,
) -> Result<Json<ApiResponse<PageId>>, AppError> {
    let last_id = service(&state)
        .page_id(&id, &table, query.page, query.page_size)
        .await?;
    Ok(Json(ApiResponse::ok_with_service(
        PageId {
            page: query.page,
            last_id,
        },
        SERVICE_NAME,
    )))
}

/// 执行 SQL（经过校验链）
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    params(("X-Connection-ID" = String, Header, description = "连接 ID")),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "执行结果", body = ApiResponse<QueryResult>),
        (status = 400, description = "语句被校验器拒绝或类型不支持"),
        (status = 404, description = "会话未找到")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    ConnectionId(id): ConnectionId,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, AppError> {
    req.validate()?;
    let data = service(&state).execute(&id, &req.sql).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        sessions: state.manager.cache().len().await,
        session_store: state.manager.store().kind().to_string(),
    })
}

/// 切换数据库请求
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SwitchDatabaseRequest {
    /// 目标数据库
    #[validate(length(min = 1, message = "database is required"))]
    pub database: String,
}

/// 切换表请求
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SwitchTableRequest {
    /// 目标表
    #[validate(length(min = 1, message = "table is required"))]
    pub table: String,
}

/// 表数据查询参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableDataQuery {
    /// 页码（从 1 开始）
    pub page: Option<u32>,
    /// 每页行数
    pub page_size: Option<u32>,
    /// 游标（上一页返回的 next_id）
    pub last_id: Option<i64>,
    /// 游标方向
    pub direction: Option<Direction>,
}

/// 页起始游标查询参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageIdQuery {
    /// 目标页码
    pub page: u32,
    /// 每页行数
    pub page_size: Option<u32>,
}

/// 表结构
#[derive(Serialize, ToSchema)]
pub struct TableSchema {
    pub table: String,
    pub schema: String,
}

/// 页起始游标
#[derive(Serialize, ToSchema)]
pub struct PageId {
    pub page: u32,
    /// 作为 `last_id` 传入即可读取该页；第一页为空
    pub last_id: Option<i64>,
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 本进程缓存的会话数
    pub sessions: usize,
    /// 会话存储类型
    pub session_store: String,
}
