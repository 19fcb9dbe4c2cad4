//! 系统状态门
//!
//! `bot_config` 表中的持久化开关 `system_status`，调度循环在
//! 调用执行器前检查。键缺失时默认running；start/stop是仅有的
//! 两个写入口。

use serde::{Deserialize, Serialize};
use sqlx::{MySql, Pool};
use tracing::info;

use crate::error::AppResult;
use crate::trading::model::bot_config::SqlxBotConfigRepository;

const STATUS_KEY: &str = "system_status";

/// 门状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Running,
    Stopped,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusRecord {
    status: GateStatus,
}

/// 系统状态门服务
pub struct SystemStatusService {
    repo: SqlxBotConfigRepository,
}

impl SystemStatusService {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self {
            repo: SqlxBotConfigRepository::new(pool),
        }
    }

    /// 当前门状态；记录缺失或损坏时默认running
    pub async fn status(&self) -> AppResult<GateStatus> {
        match self.repo.get(STATUS_KEY).await? {
            Some(raw) => match serde_json::from_str::<StatusRecord>(&raw) {
                Ok(record) => Ok(record.status),
                Err(_) => Ok(GateStatus::Running),
            },
            None => Ok(GateStatus::Running),
        }
    }

    pub async fn is_running(&self) -> AppResult<bool> {
        Ok(self.status().await? == GateStatus::Running)
    }

    pub async fn start(&self) -> AppResult<()> {
        info!("系统状态门: running");
        self.set(GateStatus::Running).await
    }

    pub async fn stop(&self) -> AppResult<()> {
        info!("系统状态门: stopped");
        self.set(GateStatus::Stopped).await
    }

    async fn set(&self, status: GateStatus) -> AppResult<()> {
        let raw = serde_json::to_string(&StatusRecord { status })?;
        self.repo.set(STATUS_KEY, &raw).await
    }
}
