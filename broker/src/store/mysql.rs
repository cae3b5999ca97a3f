//! MySQL session store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use common::errors::{AppError, AppResult};
use common::models::SessionData;

use super::SessionStore;

/// Records live in `connection_sessions`, one JSON document per ID.
pub struct MySqlSessionStore {
    pool: MySqlPool,
}

impl MySqlSessionStore {
    /// Connects and makes sure the table exists.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| AppError::SessionStore(format!("mysql: {}", e)))?;
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `connection_sessions` (
                `id`         VARCHAR(64)  NOT NULL,
                `data`       LONGTEXT     NOT NULL,
                `expires_at` DATETIME     NOT NULL,
                `updated_at` DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (`id`),
                KEY `idx_expires_at` (`expires_at`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::SessionStore(format!("Failed to create connection_sessions table: {}", e)))?;

        tracing::info!("Session table `connection_sessions` ensured");
        Ok(())
    }

    /// Deletes expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM `connection_sessions` WHERE `expires_at` <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::SessionStore(format!("mysql: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for MySqlSessionStore {
    async fn get(&self, id: &str) -> AppResult<Option<SessionData>> {
        let data: Option<String> = sqlx::query_scalar(
            "SELECT `data` FROM `connection_sessions` WHERE `id` = ? AND `expires_at` > NOW()",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::SessionStore(format!("mysql: {}", e)))?;

        data.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn set(&self, id: &str, data: &SessionData, ttl: Duration) -> AppResult<()> {
        let json = serde_json::to_string(data)?;
        sqlx::query(
            "INSERT INTO `connection_sessions` (`id`, `data`, `expires_at`)
             VALUES (?, ?, DATE_ADD(NOW(), INTERVAL ? SECOND))
             ON DUPLICATE KEY UPDATE `data` = VALUES(`data`), `expires_at` = VALUES(`expires_at`)",
        )
        .bind(id)
        .bind(json)
        .bind(ttl.as_secs())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::SessionStore(format!("Failed to save session: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM `connection_sessions` WHERE `id` = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::SessionStore(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "mysql"
    }
}
