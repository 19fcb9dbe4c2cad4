//! 订单执行器
//!
//! 消费对账计划，经交易所接口落地变更并回写存储。
//! 顺序恒为先撤后建：改价时先释放占用余额，避免交易所侧
//! 余额不足拒单。单笔失败不中断本轮其余变更。

use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::trading::exchange::{ExchangeApi, PairFilters, PlaceOrderRequest};
use crate::trading::model::order::{GridOrder, OrderStatus, SqlxOrderRepository};
use crate::trading::services::filter_service::validate_spec;
use crate::trading::strategy::grid_strategy::OrderSpec;
use crate::trading::strategy::reconciler::ReconcilePlan;

/// 单轮执行结果
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionReport {
    pub canceled: usize,
    pub created: usize,
    /// 本地校验失败被跳过的订单数
    pub skipped: usize,
    /// 交易所硬拒绝的订单数
    pub failed: usize,
}

/// 由应有订单构造存储实体
pub fn order_from_spec(
    basket_id: &str,
    spec: &OrderSpec,
    venue_order_id: Option<i64>,
    now: DateTime<Utc>,
) -> GridOrder {
    GridOrder {
        id: None,
        basket_id: basket_id.to_string(),
        venue_order_id,
        client_order_id: spec.client_order_id.clone(),
        side: spec.side,
        order_type: spec.order_type.clone(),
        price: spec.price,
        qty: spec.qty,
        status: OrderStatus::New,
        created_at: now,
        filled_at: None,
        updated_at: now,
    }
}

/// 执行器服务
pub struct ExecutorService {
    order_repo: SqlxOrderRepository,
}

impl ExecutorService {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self {
            order_repo: SqlxOrderRepository::new(pool),
        }
    }

    /// 应用对账计划：撤销to_cancel，创建to_create
    pub async fn apply_plan(
        &self,
        exchange: &dyn ExchangeApi,
        pair: &str,
        basket_id: &str,
        plan: &ReconcilePlan,
        filters: &PairFilters,
    ) -> AppResult<ExecutionReport> {
        let mut report = ExecutionReport::default();

        for client_order_id in &plan.to_cancel {
            match exchange.cancel_order(pair, client_order_id).await {
                Ok(_) => {
                    self.order_repo.mark_canceled(client_order_id).await?;
                    report.canceled += 1;
                }
                // 订单已不在交易所：静默吸收，本地对齐为已撤销
                Err(e) if e.is_unknown_order() => {
                    self.order_repo.mark_canceled(client_order_id).await?;
                    report.canceled += 1;
                }
                Err(e) => {
                    error!("撤单失败: client_order_id={}, err={}", client_order_id, e);
                    report.failed += 1;
                }
            }
        }

        for spec in &plan.to_create {
            if let Err(e) = validate_spec(spec, filters) {
                warn!(
                    "订单未通过本地校验，跳过: client_order_id={}, err={}",
                    spec.client_order_id, e
                );
                report.skipped += 1;
                continue;
            }

            let request = PlaceOrderRequest::limit_gtc(
                pair,
                spec.side,
                spec.price,
                spec.qty,
                &spec.client_order_id,
            );
            match exchange.place_order(&request).await {
                Ok(venue_order) => {
                    let order = order_from_spec(
                        basket_id,
                        spec,
                        Some(venue_order.venue_order_id),
                        Utc::now(),
                    );
                    self.order_repo.upsert_placed(&order).await?;
                    report.created += 1;
                }
                // 订单已存在：幂等重下视为成功，交易所订单ID待下轮挂单同步回填
                Err(e) if e.is_duplicate_order() => {
                    let order = order_from_spec(basket_id, spec, None, Utc::now());
                    self.order_repo.upsert_placed(&order).await?;
                    report.created += 1;
                }
                Err(e) => {
                    error!(
                        "下单失败: client_order_id={}, err={}",
                        spec.client_order_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "执行完成: basket_id={}, canceled={}, created={}, skipped={}, failed={}",
            basket_id, report.canceled, report.created, report.skipped, report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::exchange::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_from_spec() {
        let spec = OrderSpec {
            side: OrderSide::Buy,
            order_type: "LIMIT".to_string(),
            price: dec!(142.500),
            qty: dec!(0.56),
            client_order_id: "SOLUSDC_m1abc2d3ef00_B_1".to_string(),
        };
        let now = Utc::now();

        let order = order_from_spec("m1abc2d3ef00", &spec, Some(998877), now);
        assert_eq!(order.basket_id, "m1abc2d3ef00");
        assert_eq!(order.venue_order_id, Some(998877));
        assert_eq!(order.status, OrderStatus::New);
        assert!(order.filled_at.is_none());

        // -2010幂等路径：交易所订单ID留空待回填
        let order = order_from_spec("m1abc2d3ef00", &spec, None, now);
        assert_eq!(order.venue_order_id, None);
    }
}
