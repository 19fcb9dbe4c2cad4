use std::time::Duration;

use once_cell::sync::OnceCell;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use tracing::{error, info};

use crate::app_config::env::env_parsed;

static DB_POOL: OnceCell<Pool<MySql>> = OnceCell::new();

/// 初始化数据库连接池，进程内只执行一次
pub async fn init_db() -> anyhow::Result<&'static Pool<MySql>> {
    if let Some(pool) = DB_POOL.get() {
        return Ok(pool);
    }

    info!("Initializing database connection pool...");
    let db_host = std::env::var("DB_HOST").expect("DB_HOST must be set");
    let max_connections = env_parsed::<u32>("DB_MAX_CONNECTIONS", 20);

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .max_lifetime(Some(Duration::from_secs(3600)))
        .connect(&db_host)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    info!(
        "Connection pool configured with {} max connections",
        max_connections
    );

    if DB_POOL.set(pool).is_err() {
        error!("DB_POOL was initialized concurrently");
    }
    Ok(DB_POOL.get().expect("DB_POOL is not initialized"))
}

/// 获取全局连接池（必须先调用init_db）
pub fn get_db_pool() -> &'static Pool<MySql> {
    DB_POOL.get().expect("DB_POOL is not initialized")
}

/// 关闭连接池（优雅停机钩子）
pub async fn close_db() {
    if let Some(pool) = DB_POOL.get() {
        pool.close().await;
        info!("database pool closed");
    }
}
