//! 紧急平仓
//!
//! 带外触发的单一操作：撤掉篮子在交易所的全部挂单，持仓超过
//! 尘埃阈值时以安全折价挂一笔退出卖单。本地写入在单个事务内，
//! 存储失败整体回滚。篮子保持active，下一轮循环可继续交易
//! （除非系统状态门已stopped）。

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{MySql, Pool};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::trading::exchange::{ExchangeApi, OrderSide, PlaceOrderRequest};
use crate::trading::model::basket::SqlxBasketRepository;
use crate::trading::model::fill::{summarize_position, SqlxFillRepository};
use crate::trading::model::order::GridOrder;
use crate::trading::services::filter_service;
use crate::trading::strategy::grid_config::GridConfig;
use crate::trading::strategy::grid_strategy::dust_threshold;
use crate::trading::strategy::numeric::round_down;

/// 默认安全折价：3%
pub fn default_safety_margin() -> Decimal {
    Decimal::new(3, 2)
}

/// 紧急平仓结果
#[derive(Debug, Clone)]
pub struct EmergencyCloseResult {
    pub success: bool,
    pub message: String,
    pub canceled_count: u32,
    pub exit_order_placed: bool,
}

/// 计算退出卖单的价格与数量（纯函数）
///
/// 价格按当前价折让安全边际后向下对齐tick，数量按lot截断。
pub fn compute_emergency_exit(
    current_price: Decimal,
    position: Decimal,
    safety_margin: Decimal,
    tick_size: Decimal,
    lot_size: Decimal,
) -> (Decimal, Decimal) {
    let exit_price = round_down(current_price * (Decimal::ONE - safety_margin), tick_size);
    let exit_qty = round_down(position, lot_size);
    (exit_price, exit_qty)
}

/// 紧急平仓服务
pub struct EmergencyCloser {
    pool: Pool<MySql>,
    exchange: Arc<dyn ExchangeApi>,
    basket_repo: SqlxBasketRepository,
    fill_repo: SqlxFillRepository,
}

impl EmergencyCloser {
    pub fn new(pool: Pool<MySql>, exchange: Arc<dyn ExchangeApi>) -> Self {
        Self {
            basket_repo: SqlxBasketRepository::new(pool.clone()),
            fill_repo: SqlxFillRepository::new(pool.clone()),
            pool,
            exchange,
        }
    }

    /// 对指定篮子执行紧急平仓
    pub async fn close_basket(
        &self,
        basket_id: &str,
        safety_margin: Decimal,
    ) -> EmergencyCloseResult {
        match self.close_basket_inner(basket_id, safety_margin).await {
            Ok(result) => result,
            Err(e) => {
                error!("紧急平仓失败: basket_id={}, err={}", basket_id, e);
                EmergencyCloseResult {
                    success: false,
                    message: format!("emergency close failed: {}", e),
                    canceled_count: 0,
                    exit_order_placed: false,
                }
            }
        }
    }

    async fn close_basket_inner(
        &self,
        basket_id: &str,
        safety_margin: Decimal,
    ) -> AppResult<EmergencyCloseResult> {
        let basket = self
            .basket_repo
            .find_by_basket_id(basket_id)
            .await?
            .ok_or_else(|| AppError::Config(format!("篮子不存在: {}", basket_id)))?;
        let filters =
            filter_service::get_filters(self.exchange.as_ref(), &basket.pair).await?;
        let cfg = GridConfig::from_json(&basket.config_json)?.with_filters(&filters);

        let open_orders: Vec<_> = self
            .exchange
            .open_orders(&basket.pair)
            .await?
            .into_iter()
            .filter(|o| {
                GridOrder::belongs_to_basket(&o.client_order_id, &basket.pair, &basket.basket_id)
            })
            .collect();

        let fills = self.fill_repo.find_by_basket(&basket.basket_id).await?;
        let position = summarize_position(&fills).position_base_qty();

        // 行情读取放在事务外：事务一旦开启，只允许存储失败触发回滚
        let exit_target = if position > dust_threshold() {
            let current_price = self.exchange.current_price(&basket.pair).await?;
            let (exit_price, exit_qty) = compute_emergency_exit(
                current_price,
                position,
                safety_margin,
                cfg.tick_size,
                cfg.lot_size,
            );
            (exit_qty > Decimal::ZERO).then_some((exit_price, exit_qty))
        } else {
            None
        };

        // 本地写入走单个事务，与执行器写入串行化
        let mut tx = self.pool.begin().await?;

        let mut canceled_count: u32 = 0;
        for order in &open_orders {
            match self
                .exchange
                .cancel_order(&basket.pair, &order.client_order_id)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_unknown_order() => {}
                Err(e) => {
                    warn!(
                        "紧急撤单失败，继续处理剩余挂单: client_order_id={}, err={}",
                        order.client_order_id, e
                    );
                    continue;
                }
            }
            sqlx::query(
                r#"UPDATE orders SET status = 'canceled', updated_at = NOW()
                   WHERE client_order_id = ? AND status IN ('new', 'partially_filled')"#,
            )
            .bind(&order.client_order_id)
            .execute(&mut *tx)
            .await?;
            canceled_count += 1;
        }

        let mut exit_order_placed = false;
        let mut exit_failure: Option<String> = None;
        if let Some((exit_price, exit_qty)) = exit_target {
            let client_order_id = GridOrder::emergency_client_id(&basket.pair, &basket.basket_id);
            let request = PlaceOrderRequest::limit_gtc(
                &basket.pair,
                OrderSide::Sell,
                exit_price,
                exit_qty,
                &client_order_id,
            );

            // 下单被拒不触发回滚：交易所侧已生效的撤销必须持久化
            let placed = match self.exchange.place_order(&request).await {
                Ok(venue_order) => Some(Some(venue_order.venue_order_id)),
                Err(e) if e.is_duplicate_order() => Some(None),
                Err(e) => {
                    error!(
                        "紧急退出单下单失败: basket_id={}, err={}",
                        basket.basket_id, e
                    );
                    exit_failure = Some(e.to_string());
                    None
                }
            };

            if let Some(venue_order_id) = placed {
                let now = Utc::now();
                sqlx::query(
                    r#"INSERT INTO orders
                       (basket_id, venue_order_id, client_order_id, side, order_type,
                        price, qty, status, created_at, updated_at)
                       VALUES (?, ?, ?, ?, 'LIMIT', ?, ?, 'new', ?, NOW())
                       ON DUPLICATE KEY UPDATE
                         venue_order_id = COALESCE(VALUES(venue_order_id), venue_order_id),
                         updated_at = NOW()"#,
                )
                .bind(&basket.basket_id)
                .bind(venue_order_id)
                .bind(&client_order_id)
                .bind(OrderSide::Sell.as_str())
                .bind(exit_price)
                .bind(exit_qty)
                .bind(now.naive_utc())
                .execute(&mut *tx)
                .await?;

                exit_order_placed = true;
                info!(
                    "紧急退出单已挂: basket_id={}, price={}, qty={}",
                    basket.basket_id, exit_price, exit_qty
                );
            }
        }

        tx.commit().await?;

        // 篮子保持active：是否恢复交易交给系统状态门决定
        info!(
            "紧急平仓完成: basket_id={}, canceled={}, exit_placed={}",
            basket.basket_id, canceled_count, exit_order_placed
        );
        let message = match &exit_failure {
            Some(err) => format!(
                "canceled {} open orders, exit order failed: {}",
                canceled_count, err
            ),
            None => format!(
                "canceled {} open orders, exit order placed: {}",
                canceled_count, exit_order_placed
            ),
        };
        Ok(EmergencyCloseResult {
            success: exit_failure.is_none(),
            message,
            canceled_count,
            exit_order_placed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// 场景S5：现价130、折价3%、持仓2.61
    #[test]
    fn test_s5_exit_computation() {
        let (price, qty) = compute_emergency_exit(
            dec!(130),
            dec!(2.61),
            dec!(0.03),
            dec!(0.001),
            dec!(0.01),
        );
        assert_eq!(price, dec!(126.100));
        assert_eq!(qty, dec!(2.61));
    }

    #[test]
    fn test_exit_rounds_down_to_steps() {
        let (price, qty) = compute_emergency_exit(
            dec!(130.1234),
            dec!(2.6199),
            dec!(0.03),
            dec!(0.001),
            dec!(0.01),
        );
        // 130.1234·0.97 = 126.219698
        assert_eq!(price, dec!(126.219));
        assert_eq!(qty, dec!(2.61));
    }

    #[test]
    fn test_dust_position_rounds_to_zero_qty() {
        let (_, qty) = compute_emergency_exit(
            dec!(130),
            dec!(0.004),
            dec!(0.03),
            dec!(0.001),
            dec!(0.01),
        );
        assert_eq!(qty, Decimal::ZERO);
    }

    #[test]
    fn test_default_safety_margin() {
        assert_eq!(default_safety_margin(), dec!(0.03));
    }
}
