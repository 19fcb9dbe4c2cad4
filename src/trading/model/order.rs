//! 订单实体与仓储
//!
//! 对应数据库表 `orders`。客户端订单ID全库唯一，是对账的唯一键；
//! 交易所订单ID在成功下单后回填，用于成交归属。
//!
//! 客户端订单ID文法: `{pair}_{basket_id}_{B|S}_{slot}`，
//! slot为档位序号(1..N)或TP1/TP2/TRAIL/EMERGENCY，总长≤36字符。

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, Pool};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::trading::exchange::OrderSide;

/// 交易所对客户端订单ID的长度上限
pub const MAX_CLIENT_ORDER_ID_LEN: usize = 36;

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(OrderStatus::New),
            "partially_filled" => Some(OrderStatus::PartiallyFilled),
            "filled" => Some(OrderStatus::Filled),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// 订单是否仍可能在交易所挂着
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// 订单实体
#[derive(Debug, Clone)]
pub struct GridOrder {
    pub id: Option<i64>,
    pub basket_id: String,

    /// 交易所订单ID，下单成功后回填
    pub venue_order_id: Option<i64>,

    /// 客户端订单ID（全库唯一，对账键）
    pub client_order_id: String,

    pub side: OrderSide,

    /// 订单类型，沿用交易所命名（如 "LIMIT"）
    pub order_type: String,

    pub price: Decimal,
    pub qty: Decimal,
    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GridOrder {
    /// 买入档位的客户端订单ID，档位序号从1开始
    pub fn level_client_id(pair: &str, basket_id: &str, level: usize) -> String {
        format!("{}_{}_B_{}", pair, basket_id, level)
    }

    /// 卖出腿的客户端订单ID，slot为TP1/TP2/TRAIL
    pub fn sell_client_id(pair: &str, basket_id: &str, slot: &str) -> String {
        format!("{}_{}_S_{}", pair, basket_id, slot)
    }

    /// 紧急平仓单的客户端订单ID
    pub fn emergency_client_id(pair: &str, basket_id: &str) -> String {
        Self::sell_client_id(pair, basket_id, "EMERGENCY")
    }

    /// 客户端订单ID是否属于指定篮子的命名空间
    pub fn belongs_to_basket(client_order_id: &str, pair: &str, basket_id: &str) -> bool {
        client_order_id.starts_with(&format!("{}_{}_", pair, basket_id))
    }
}

/// 订单数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct GridOrderEntity {
    pub id: i64,
    pub basket_id: String,
    pub venue_order_id: Option<i64>,
    pub client_order_id: String,
    pub side: String,
    pub order_type: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub filled_at: Option<chrono::NaiveDateTime>,
    pub updated_at: chrono::NaiveDateTime,
}

impl GridOrderEntity {
    pub fn to_domain(&self) -> GridOrder {
        GridOrder {
            id: Some(self.id),
            basket_id: self.basket_id.clone(),
            venue_order_id: self.venue_order_id,
            client_order_id: self.client_order_id.clone(),
            side: OrderSide::from_str(&self.side).unwrap_or(OrderSide::Buy),
            order_type: self.order_type.clone(),
            price: self.price,
            qty: self.qty,
            status: OrderStatus::from_str(&self.status).unwrap_or(OrderStatus::Canceled),
            created_at: Utc.from_utc_datetime(&self.created_at),
            filled_at: self.filled_at.map(|dt| Utc.from_utc_datetime(&dt)),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        }
    }
}

const ORDER_COLUMNS: &str = r#"id, basket_id, venue_order_id, client_order_id, side,
    order_type, price, qty, status, created_at, filled_at, updated_at"#;

/// 订单仓储实现 (基于 sqlx)
pub struct SqlxOrderRepository {
    pool: Pool<MySql>,
}

impl SqlxOrderRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn find_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> AppResult<Option<GridOrder>> {
        debug!("查询订单: client_order_id={}", client_order_id);

        let entity = sqlx::query_as::<_, GridOrderEntity>(&format!(
            "SELECT {} FROM orders WHERE client_order_id = ? LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(client_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.to_domain()))
    }

    pub async fn find_by_venue_order_id(&self, venue_order_id: i64) -> AppResult<Option<GridOrder>> {
        let entity = sqlx::query_as::<_, GridOrderEntity>(&format!(
            "SELECT {} FROM orders WHERE venue_order_id = ? LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(venue_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.to_domain()))
    }

    /// 篮子下仍处于挂单状态的订单
    pub async fn find_open_by_basket(&self, basket_id: &str) -> AppResult<Vec<GridOrder>> {
        let entities = sqlx::query_as::<_, GridOrderEntity>(&format!(
            r#"SELECT {} FROM orders
               WHERE basket_id = ? AND status IN ('new', 'partially_filled')
               ORDER BY created_at ASC"#,
            ORDER_COLUMNS
        ))
        .bind(basket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    /// 下单成功后落库；客户端订单ID冲突时回填交易所订单ID（幂等重下）
    pub async fn upsert_placed(&self, order: &GridOrder) -> AppResult<()> {
        info!(
            "保存订单: client_order_id={}, side={}, price={}, qty={}",
            order.client_order_id,
            order.side.as_str(),
            order.price,
            order.qty
        );

        sqlx::query(
            r#"INSERT INTO orders
               (basket_id, venue_order_id, client_order_id, side, order_type,
                price, qty, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NOW())
               ON DUPLICATE KEY UPDATE
                 venue_order_id = COALESCE(VALUES(venue_order_id), venue_order_id),
                 price = VALUES(price),
                 qty = VALUES(qty),
                 status = VALUES(status),
                 updated_at = NOW()"#,
        )
        .bind(&order.basket_id)
        .bind(order.venue_order_id)
        .bind(&order.client_order_id)
        .bind(order.side.as_str())
        .bind(&order.order_type)
        .bind(order.price)
        .bind(order.qty)
        .bind(order.status.as_str())
        .bind(order.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_canceled(&self, client_order_id: &str) -> AppResult<()> {
        debug!("标记订单已撤销: client_order_id={}", client_order_id);

        sqlx::query(
            r#"UPDATE orders SET status = 'canceled', updated_at = NOW()
               WHERE client_order_id = ? AND status IN ('new', 'partially_filled')"#,
        )
        .bind(client_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 根据累计成交推进订单状态；完全成交时必须带成交时间
    pub async fn update_fill_progress(
        &self,
        client_order_id: &str,
        filled_qty: Decimal,
        order_qty: Decimal,
        executed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if filled_qty >= order_qty {
            sqlx::query(
                r#"UPDATE orders SET status = 'filled', filled_at = ?, updated_at = NOW()
                   WHERE client_order_id = ?"#,
            )
            .bind(executed_at.naive_utc())
            .bind(client_order_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"UPDATE orders SET status = 'partially_filled', updated_at = NOW()
                   WHERE client_order_id = ? AND status = 'new'"#,
            )
            .bind(client_order_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// 回填交易所订单ID（-2010幂等重下后，下一轮从挂单同步）
    pub async fn update_venue_order_id(
        &self,
        client_order_id: &str,
        venue_order_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"UPDATE orders SET venue_order_id = ?, updated_at = NOW()
               WHERE client_order_id = ? AND venue_order_id IS NULL"#,
        )
        .bind(venue_order_id)
        .bind(client_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_id_grammar() {
        let buy = GridOrder::level_client_id("SOLUSDC", "m1abc2d3ef00", 3);
        assert_eq!(buy, "SOLUSDC_m1abc2d3ef00_B_3");

        let tp1 = GridOrder::sell_client_id("SOLUSDC", "m1abc2d3ef00", "TP1");
        assert_eq!(tp1, "SOLUSDC_m1abc2d3ef00_S_TP1");

        let emergency = GridOrder::emergency_client_id("SOLUSDC", "m1abc2d3ef00");
        assert_eq!(emergency, "SOLUSDC_m1abc2d3ef00_S_EMERGENCY");

        for id in [&buy, &tp1, &emergency] {
            assert!(id.len() <= MAX_CLIENT_ORDER_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn test_belongs_to_basket() {
        assert!(GridOrder::belongs_to_basket(
            "SOLUSDC_m1abc2d3ef00_B_1",
            "SOLUSDC",
            "m1abc2d3ef00"
        ));
        // 其他篮子的订单不在命名空间内
        assert!(!GridOrder::belongs_to_basket(
            "SOLUSDC_zzzz_B_1",
            "SOLUSDC",
            "m1abc2d3ef00"
        ));
        // 前缀相似但篮子ID更长时不得误判
        assert!(!GridOrder::belongs_to_basket(
            "SOLUSDC_m1abc2d3ef0099_B_1",
            "SOLUSDC",
            "m1abc2d3ef00"
        ));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OrderStatus::New,
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled,
            OrderStatus::Canceled,
        ] {
            assert_eq!(OrderStatus::from_str(status.as_str()), Some(status));
        }
        assert!(OrderStatus::New.is_open());
        assert!(OrderStatus::PartiallyFilled.is_open());
        assert!(!OrderStatus::Filled.is_open());
        assert!(!OrderStatus::Canceled.is_open());
    }

    #[test]
    fn test_entity_to_domain() {
        let entity = GridOrderEntity {
            id: 11,
            basket_id: "m1abc2d3ef00".to_string(),
            venue_order_id: Some(998877),
            client_order_id: "SOLUSDC_m1abc2d3ef00_B_1".to_string(),
            side: "Buy".to_string(),
            order_type: "LIMIT".to_string(),
            price: dec!(142.500),
            qty: dec!(0.56),
            status: "new".to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            filled_at: None,
            updated_at: chrono::Utc::now().naive_utc(),
        };

        let domain = entity.to_domain();
        assert_eq!(domain.id, Some(11));
        assert_eq!(domain.side, OrderSide::Buy);
        assert_eq!(domain.status, OrderStatus::New);
        assert_eq!(domain.price, dec!(142.500));
        assert!(domain.filled_at.is_none());
    }
}
