//! 网格篮子实体与仓储
//!
//! 对应数据库表 `baskets`，一个篮子记录一段网格交易会话。
//! 篮子只在重锚时更新锚定价，关闭时更新状态与关闭时间，从不删除。

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, Pool};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::time_util::millis_to_base36;

/// 篮子状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasketStatus {
    Active,
    Closed,
    EmergencyClosed,
}

impl BasketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasketStatus::Active => "active",
            BasketStatus::Closed => "closed",
            BasketStatus::EmergencyClosed => "emergency_closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BasketStatus::Active),
            "closed" => Some(BasketStatus::Closed),
            "emergency_closed" => Some(BasketStatus::EmergencyClosed),
            _ => None,
        }
    }
}

/// 网格篮子实体
#[derive(Debug, Clone)]
pub struct Basket {
    /// 自增主键
    pub id: Option<i64>,

    /// 短标识，时间有序可排序，嵌入客户端订单ID（≤22字符）
    pub basket_id: String,

    /// 交易对（如 "SOLUSDC"）
    pub pair: String,

    /// 锚定价P0，网格档位从此价向下铺设
    pub anchor_price: Decimal,

    pub status: BasketStatus,

    /// 创建时的配置快照（JSON）
    pub config_json: String,

    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

static BASKET_SEQ: AtomicU32 = AtomicU32::new(0);

impl Basket {
    pub fn new(pair: &str, anchor_price: Decimal, config_json: String, now_ms: i64) -> Self {
        Self {
            id: None,
            basket_id: Self::generate_basket_id(now_ms),
            pair: pair.to_string(),
            anchor_price,
            status: BasketStatus::Active,
            config_json,
            created_at: Utc
                .timestamp_millis_opt(now_ms)
                .single()
                .unwrap_or_else(Utc::now),
            closed_at: None,
        }
    }

    /// 生成篮子短标识：毫秒时间戳base36编码 + 2位进程内序号
    ///
    /// 时间戳保证排序性，序号保证同毫秒内唯一。
    pub fn generate_basket_id(now_ms: i64) -> String {
        const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let seq = (BASKET_SEQ.fetch_add(1, Ordering::Relaxed) % 1296) as usize;
        let suffix = [DIGITS[seq / 36], DIGITS[seq % 36]];
        format!(
            "{}{}",
            millis_to_base36(now_ms),
            std::str::from_utf8(&suffix).expect("base36 digits are ascii")
        )
    }
}

/// 篮子数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct BasketEntity {
    pub id: i64,
    pub basket_id: String,
    pub pair: String,
    pub anchor_price: Decimal,
    pub status: String,
    pub config_json: String,
    pub created_at: chrono::NaiveDateTime,
    pub closed_at: Option<chrono::NaiveDateTime>,
}

impl BasketEntity {
    /// 转换为领域实体
    pub fn to_domain(&self) -> Basket {
        Basket {
            id: Some(self.id),
            basket_id: self.basket_id.clone(),
            pair: self.pair.clone(),
            anchor_price: self.anchor_price,
            status: BasketStatus::from_str(&self.status).unwrap_or(BasketStatus::Closed),
            config_json: self.config_json.clone(),
            created_at: Utc.from_utc_datetime(&self.created_at),
            closed_at: self.closed_at.map(|dt| Utc.from_utc_datetime(&dt)),
        }
    }
}

/// 篮子仓储实现 (基于 sqlx)
pub struct SqlxBasketRepository {
    pool: Pool<MySql>,
}

impl SqlxBasketRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// 查询所有活跃篮子
    pub async fn find_active(&self) -> AppResult<Vec<Basket>> {
        let entities = sqlx::query_as::<_, BasketEntity>(
            r#"SELECT id, basket_id, pair, anchor_price, status, config_json,
                      created_at, closed_at
               FROM baskets WHERE status = 'active' ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    pub async fn find_by_basket_id(&self, basket_id: &str) -> AppResult<Option<Basket>> {
        debug!("查询篮子: basket_id={}", basket_id);

        let entity = sqlx::query_as::<_, BasketEntity>(
            r#"SELECT id, basket_id, pair, anchor_price, status, config_json,
                      created_at, closed_at
               FROM baskets WHERE basket_id = ? LIMIT 1"#,
        )
        .bind(basket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.to_domain()))
    }

    pub async fn save(&self, basket: &Basket) -> AppResult<i64> {
        info!(
            "保存篮子: basket_id={}, pair={}, anchor={}",
            basket.basket_id, basket.pair, basket.anchor_price
        );

        let result = sqlx::query(
            r#"INSERT INTO baskets (basket_id, pair, anchor_price, status, config_json, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&basket.basket_id)
        .bind(&basket.pair)
        .bind(basket.anchor_price)
        .bind(basket.status.as_str())
        .bind(&basket.config_json)
        .bind(basket.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    /// 重锚：仅更新锚定价
    pub async fn update_anchor_price(
        &self,
        basket_id: &str,
        anchor_price: Decimal,
    ) -> AppResult<()> {
        info!("篮子重锚: basket_id={}, new_anchor={}", basket_id, anchor_price);

        sqlx::query(r#"UPDATE baskets SET anchor_price = ? WHERE basket_id = ?"#)
            .bind(anchor_price)
            .bind(basket_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 更新状态；进入closed/emergency_closed时记录关闭时间
    pub async fn update_status(&self, basket_id: &str, status: BasketStatus) -> AppResult<()> {
        info!("篮子状态变更: basket_id={}, status={}", basket_id, status.as_str());

        if status == BasketStatus::Active {
            sqlx::query(r#"UPDATE baskets SET status = ?, closed_at = NULL WHERE basket_id = ?"#)
                .bind(status.as_str())
                .bind(basket_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(r#"UPDATE baskets SET status = ?, closed_at = NOW() WHERE basket_id = ?"#)
                .bind(status.as_str())
                .bind(basket_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}
