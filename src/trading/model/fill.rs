//! 成交记录实体与仓储
//!
//! 对应数据库表 `fills`，一行一笔执行，写入后不可变。
//! `venue_trade_id` 全库唯一，成交同步以此去重实现幂等。

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use crate::error::AppResult;
use crate::trading::exchange::OrderSide;

/// 成交记录实体
#[derive(Debug, Clone)]
pub struct Fill {
    pub id: Option<i64>,
    pub order_id: i64,
    pub basket_id: String,

    /// 交易所成交ID（唯一，去重键）
    pub venue_trade_id: i64,

    pub side: OrderSide,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub executed_at: DateTime<Utc>,
}

/// 成交数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct FillEntity {
    pub id: i64,
    pub order_id: i64,
    pub basket_id: String,
    pub venue_trade_id: i64,
    pub side: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub executed_at: chrono::NaiveDateTime,
}

impl FillEntity {
    pub fn to_domain(&self) -> Fill {
        Fill {
            id: Some(self.id),
            order_id: self.order_id,
            basket_id: self.basket_id.clone(),
            venue_trade_id: self.venue_trade_id,
            side: OrderSide::from_str(&self.side).unwrap_or(OrderSide::Buy),
            price: self.price,
            qty: self.qty,
            commission: self.commission,
            commission_asset: self.commission_asset.clone(),
            executed_at: Utc.from_utc_datetime(&self.executed_at),
        }
    }
}

/// 按方向汇总的持仓视图
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSummary {
    pub buy_qty: Decimal,
    pub sell_qty: Decimal,
}

impl PositionSummary {
    /// 基础资产净持仓 = Σ买入 − Σ卖出
    pub fn position_base_qty(&self) -> Decimal {
        self.buy_qty - self.sell_qty
    }
}

/// 从成交列表汇总持仓（纯函数，策略与调度循环共用）
pub fn summarize_position(fills: &[Fill]) -> PositionSummary {
    let mut summary = PositionSummary::default();
    for fill in fills {
        match fill.side {
            OrderSide::Buy => summary.buy_qty += fill.qty,
            OrderSide::Sell => summary.sell_qty += fill.qty,
        }
    }
    summary
}

/// 成交仓储实现 (基于 sqlx)
pub struct SqlxFillRepository {
    pool: Pool<MySql>,
}

impl SqlxFillRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn find_by_basket(&self, basket_id: &str) -> AppResult<Vec<Fill>> {
        let entities = sqlx::query_as::<_, FillEntity>(
            r#"SELECT id, order_id, basket_id, venue_trade_id, side, price, qty,
                      commission, commission_asset, executed_at
               FROM fills WHERE basket_id = ? ORDER BY executed_at ASC"#,
        )
        .bind(basket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    pub async fn exists_by_venue_trade_id(&self, venue_trade_id: i64) -> AppResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as(r#"SELECT id FROM fills WHERE venue_trade_id = ? LIMIT 1"#)
                .bind(venue_trade_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// 插入成交；venue_trade_id冲突时静默忽略（同步重放安全）
    pub async fn insert_if_absent(&self, fill: &Fill) -> AppResult<bool> {
        debug!(
            "写入成交: venue_trade_id={}, basket_id={}, side={}, price={}, qty={}",
            fill.venue_trade_id,
            fill.basket_id,
            fill.side.as_str(),
            fill.price,
            fill.qty
        );

        let result = sqlx::query(
            r#"INSERT IGNORE INTO fills
               (order_id, basket_id, venue_trade_id, side, price, qty,
                commission, commission_asset, executed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(fill.order_id)
        .bind(&fill.basket_id)
        .bind(fill.venue_trade_id)
        .bind(fill.side.as_str())
        .bind(fill.price)
        .bind(fill.qty)
        .bind(fill.commission)
        .bind(&fill.commission_asset)
        .bind(fill.executed_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 订单的累计成交数量
    pub async fn sum_qty_by_order(&self, order_id: i64) -> AppResult<Decimal> {
        let row: Option<(Option<Decimal>,)> =
            sqlx::query_as(r#"SELECT SUM(qty) FROM fills WHERE order_id = ?"#)
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(sum,)| sum).unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: OrderSide, price: Decimal, qty: Decimal) -> Fill {
        Fill {
            id: None,
            order_id: 1,
            basket_id: "m1abc2d3ef00".to_string(),
            venue_trade_id: 0,
            side,
            price,
            qty,
            commission: Decimal::ZERO,
            commission_asset: "SOL".to_string(),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_position() {
        let fills = vec![
            fill(OrderSide::Buy, dec!(142.500), dec!(0.56)),
            fill(OrderSide::Buy, dec!(135.000), dec!(0.88)),
            fill(OrderSide::Sell, dec!(140.000), dec!(0.30)),
        ];
        let summary = summarize_position(&fills);
        assert_eq!(summary.buy_qty, dec!(1.44));
        assert_eq!(summary.sell_qty, dec!(0.30));
        assert_eq!(summary.position_base_qty(), dec!(1.14));
    }

    #[test]
    fn test_summarize_position_empty() {
        let summary = summarize_position(&[]);
        assert_eq!(summary.position_base_qty(), Decimal::ZERO);
    }

    #[test]
    fn test_entity_to_domain() {
        let entity = FillEntity {
            id: 3,
            order_id: 11,
            basket_id: "m1abc2d3ef00".to_string(),
            venue_trade_id: 777,
            side: "Sell".to_string(),
            price: dec!(134.447),
            qty: dec!(1.04),
            commission: dec!(0.001),
            commission_asset: "USDC".to_string(),
            executed_at: chrono::Utc::now().naive_utc(),
        };

        let domain = entity.to_domain();
        assert_eq!(domain.venue_trade_id, 777);
        assert_eq!(domain.side, OrderSide::Sell);
        assert_eq!(domain.qty, dec!(1.04));
    }
}
