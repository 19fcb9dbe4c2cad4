//! 账户余额快照实体与仓储
//!
//! 对应数据库表 `account_snapshots`，孤立时间序列行，写入后不可变。

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use crate::error::AppResult;

/// 账户余额快照
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub id: Option<i64>,
    pub pair: String,
    pub quote_free: Decimal,
    pub base_free: Decimal,

    /// 估算总价值 = quote_free + base_free × 最新成交价
    pub est_total_value: Decimal,

    pub created_at: DateTime<Utc>,
}

impl AccountSnapshot {
    pub fn capture(
        pair: &str,
        quote_free: Decimal,
        base_free: Decimal,
        last_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            pair: pair.to_string(),
            quote_free,
            base_free,
            est_total_value: quote_free + base_free * last_price,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountSnapshotEntity {
    pub id: i64,
    pub pair: String,
    pub quote_free: Decimal,
    pub base_free: Decimal,
    pub est_total_value: Decimal,
    pub created_at: chrono::NaiveDateTime,
}

impl AccountSnapshotEntity {
    pub fn to_domain(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: Some(self.id),
            pair: self.pair.clone(),
            quote_free: self.quote_free,
            base_free: self.base_free,
            est_total_value: self.est_total_value,
            created_at: Utc.from_utc_datetime(&self.created_at),
        }
    }
}

/// 快照仓储实现 (基于 sqlx)
pub struct SqlxAccountSnapshotRepository {
    pool: Pool<MySql>,
}

impl SqlxAccountSnapshotRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, snapshot: &AccountSnapshot) -> AppResult<()> {
        debug!(
            "写入余额快照: pair={}, quote_free={}, base_free={}, est_total={}",
            snapshot.pair, snapshot.quote_free, snapshot.base_free, snapshot.est_total_value
        );

        sqlx::query(
            r#"INSERT INTO account_snapshots
               (pair, quote_free, base_free, est_total_value, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&snapshot.pair)
        .bind(snapshot.quote_free)
        .bind(snapshot.base_free)
        .bind(snapshot.est_total_value)
        .bind(snapshot.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_recent(&self, pair: &str, limit: i32) -> AppResult<Vec<AccountSnapshot>> {
        let entities = sqlx::query_as::<_, AccountSnapshotEntity>(
            r#"SELECT id, pair, quote_free, base_free, est_total_value, created_at
               FROM account_snapshots
               WHERE pair = ? ORDER BY created_at DESC LIMIT ?"#,
        )
        .bind(pair)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }
}
