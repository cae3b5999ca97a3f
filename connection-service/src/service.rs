//! 会话管理服务模块

use std::sync::Arc;

use async_trait::async_trait;

use broker::SessionManager;
use common::errors::AppResult;
use common::models::{
    ColumnInfo, ConnectionInfo, Direction, QueryResult, SessionInfo, TableData, TableDataRequest,
};

/// 会话服务 Trait
#[async_trait]
pub trait SessionServiceTrait: Send + Sync {
    /// 建立连接并创建会话
    async fn connect(&self, info: ConnectionInfo) -> AppResult<SessionInfo>;

    /// 关闭会话
    async fn disconnect(&self, id: &str) -> AppResult<()>;

    /// 获取会话信息
    async fn session(&self, id: &str) -> AppResult<SessionInfo>;

    /// 列出数据库
    async fn databases(&self, id: &str) -> AppResult<Vec<String>>;

    /// 切换数据库
    async fn switch_database(&self, id: &str, database: &str) -> AppResult<SessionInfo>;

    /// 列出当前数据库中的表
    async fn tables(&self, id: &str) -> AppResult<Vec<String>>;

    /// 切换当前表
    async fn switch_table(&self, id: &str, table: &str) -> AppResult<SessionInfo>;

    /// 获取表结构定义
    async fn table_schema(&self, id: &str, table: &str) -> AppResult<String>;

    /// 获取列信息
    async fn table_columns(&self, id: &str, table: &str) -> AppResult<Vec<ColumnInfo>>;

    /// 分页读取表数据
    async fn table_data(&self, id: &str, query: TableDataParams) -> AppResult<TableData>;

    /// 获取指定页的起始游标
    async fn page_id(&self, id: &str, table: &str, page: u32, page_size: Option<u32>) -> AppResult<Option<i64>>;

    /// 执行 SQL
    async fn execute(&self, id: &str, sql: &str) -> AppResult<QueryResult>;
}

/// 表数据分页参数（未填写的字段使用默认值）
#[derive(Debug, Clone, Default)]
pub struct TableDataParams {
    pub table: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub last_id: Option<i64>,
    pub direction: Option<Direction>,
}

/// 会话管理服务
pub struct SessionService {
    manager: Arc<SessionManager>,
    default_page_size: u32,
}

impl SessionService {
    /// 创建新的会话服务实例
    pub fn new(manager: Arc<SessionManager>, default_page_size: u32) -> Self {
        Self {
            manager,
            default_page_size,
        }
    }
}

#[async_trait]
impl SessionServiceTrait for SessionService {
    async fn connect(&self, info: ConnectionInfo) -> AppResult<SessionInfo> {
        self.manager.connect(info).await
    }

    async fn disconnect(&self, id: &str) -> AppResult<()> {
        self.manager.disconnect(id).await
    }

    async fn session(&self, id: &str) -> AppResult<SessionInfo> {
        self.manager.session_info(id).await
    }

    async fn databases(&self, id: &str) -> AppResult<Vec<String>> {
        self.manager.get_databases(id).await
    }

    async fn switch_database(&self, id: &str, database: &str) -> AppResult<SessionInfo> {
        self.manager.switch_database(id, database).await
    }

    async fn tables(&self, id: &str) -> AppResult<Vec<String>> {
        self.manager.get_tables(id).await
    }

    async fn switch_table(&self, id: &str, table: &str) -> AppResult<SessionInfo> {
        self.manager.switch_table(id, table).await
    }

    async fn table_schema(&self, id: &str, table: &str) -> AppResult<String> {
        self.manager.get_table_schema(id, table).await
    }

    async fn table_columns(&self, id: &str, table: &str) -> AppResult<Vec<ColumnInfo>> {
        self.manager.get_table_columns(id, table).await
    }

    async fn table_data(&self, id: &str, query: TableDataParams) -> AppResult<TableData> {
        let request = TableDataRequest {
            table: query.table,
            page: query.page.unwrap_or(1),
            page_size: query.page_size.unwrap_or(self.default_page_size),
            last_id: query.last_id,
            direction: query.direction.unwrap_or_default(),
        };
        self.manager.get_table_data(id, &request).await
    }

    async fn page_id(&self, id: &str, table: &str, page: u32, page_size: Option<u32>) -> AppResult<Option<i64>> {
        let page_size = page_size.unwrap_or(self.default_page_size);
        self.manager.get_page_id(id, table, page, page_size).await
    }

    async fn execute(&self, id: &str, sql: &str) -> AppResult<QueryResult> {
        self.manager.execute(id, sql).await
    }
}
