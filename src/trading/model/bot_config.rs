//! 全局键值配置仓储
//!
//! 对应数据库表 `bot_config`，持久化全局开关与覆盖项
//! （如系统状态门）。键唯一，set为upsert语义。

use sqlx::{MySql, Pool};
use tracing::debug;

use crate::error::AppResult;

/// 键值配置仓储实现 (基于 sqlx)
pub struct SqlxBotConfigRepository {
    pool: Pool<MySql>,
}

impl SqlxBotConfigRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT v FROM bot_config WHERE k = ? LIMIT 1"#)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(v,)| v))
    }

    pub async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        debug!("写入配置: {}={}", key, value);

        sqlx::query(
            r#"INSERT INTO bot_config (k, v, updated_at) VALUES (?, ?, NOW())
               ON DUPLICATE KEY UPDATE v = VALUES(v), updated_at = NOW()"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
