pub mod app_config;
pub mod error;
pub mod job;
pub mod time_util;
pub mod trading;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dotenv::dotenv;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::app_config::env::env_parsed;
use crate::job::GridJob;
use crate::trading::binance::BinanceClient;

/// 应用初始化：环境变量、日志、数据库连接池
pub async fn app_init() -> anyhow::Result<()> {
    dotenv().ok();

    crate::app_config::log::setup_logging().await?;
    crate::app_config::db::init_db().await?;
    info!("应用初始化完成");
    Ok(())
}

/// 运行主循环，收到中断信号后当前轮跑完退出
pub async fn run() -> anyhow::Result<()> {
    let pool = crate::app_config::db::get_db_pool().clone();
    let exchange = Arc::new(BinanceClient::from_env()?);
    let interval = Duration::from_secs(env_parsed::<u64>("GRID_CHECK_INTERVAL_SECS", 5));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，当前轮结束后停机");
            shutdown_flag.store(true, Ordering::Release);
        }
    });

    let job = GridJob::new(pool, exchange);
    job.run(shutdown, interval).await;

    crate::app_config::db::close_db().await;
    info!("停机完成");
    Ok(())
}
