//! 网格调度循环
//!
//! 固定节奏驱动 拉取→策略→对账→执行 流水线。篮子间串行处理、
//! 互相隔离：单篮子失败只记日志，不影响同轮其他篮子。
//! 所有计算均可由持久化状态+交易所实时读取重建，进程被杀后
//! 从上次状态原样恢复。
//!
//! 超时的轮次不做追赶：每轮结束后固定sleep(interval)，
//! 节奏由sleep决定而不是排程表。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, Pool};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::time_util::now_millis;
use crate::trading::exchange::ExchangeApi;
use crate::trading::model::basket::{Basket, SqlxBasketRepository};
use crate::trading::model::fill::{summarize_position, Fill, SqlxFillRepository};
use crate::trading::model::order::{GridOrder, SqlxOrderRepository};
use crate::trading::model::account_snapshot::{AccountSnapshot, SqlxAccountSnapshotRepository};
use crate::trading::services::executor_service::ExecutorService;
use crate::trading::services::filter_service;
use crate::trading::services::system_status::SystemStatusService;
use crate::trading::strategy::grid_config::GridConfig;
use crate::trading::strategy::grid_strategy::{
    dust_threshold, plan_grid, FillRecord, GridPlan, MarketView, StrategyState,
};
use crate::trading::strategy::reconciler::reconcile;

/// 成交同步回看窗口：24小时
const TRADE_SYNC_WINDOW_MS: i64 = 24 * 3600 * 1000;

/// 每10轮写一次余额快照
const SNAPSHOT_EVERY_N_CYCLES: u64 = 10;

/// 网格调度任务
pub struct GridJob {
    pool: Pool<MySql>,
    exchange: Arc<dyn ExchangeApi>,
    basket_repo: SqlxBasketRepository,
    order_repo: SqlxOrderRepository,
    fill_repo: SqlxFillRepository,
    snapshot_repo: SqlxAccountSnapshotRepository,
    gate: SystemStatusService,
    executor: ExecutorService,
}

impl GridJob {
    pub fn new(pool: Pool<MySql>, exchange: Arc<dyn ExchangeApi>) -> Self {
        Self {
            basket_repo: SqlxBasketRepository::new(pool.clone()),
            order_repo: SqlxOrderRepository::new(pool.clone()),
            fill_repo: SqlxFillRepository::new(pool.clone()),
            snapshot_repo: SqlxAccountSnapshotRepository::new(pool.clone()),
            gate: SystemStatusService::new(pool.clone()),
            executor: ExecutorService::new(pool.clone()),
            exchange,
            pool,
        }
    }

    /// 主循环；shutdown置位后当前轮跑完即退出
    pub async fn run(&self, shutdown: Arc<AtomicBool>, interval: Duration) {
        info!("网格调度循环启动, interval={:?}", interval);
        let mut cycle: u64 = 0;

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("收到停机信号，调度循环退出");
                break;
            }
            cycle += 1;

            let started = Instant::now();
            // 任何轮内错误只记日志，循环永不中断
            if let Err(e) = self.run_cycle(cycle).await {
                error!("本轮执行失败: cycle={}, err={}", cycle, e);
            }
            info!("cycle={} 耗时 {:?}", cycle, started.elapsed());

            tokio::time::sleep(interval).await;
        }
    }

    async fn run_cycle(&self, cycle: u64) -> AppResult<()> {
        let baskets = self.basket_repo.find_active().await?;
        if baskets.is_empty() {
            return Ok(());
        }

        for basket in &baskets {
            if let Err(e) = self.process_basket(basket).await {
                error!("篮子处理失败: basket_id={}, err={}", basket.basket_id, e);
            }
        }

        if cycle % SNAPSHOT_EVERY_N_CYCLES == 0 {
            if let Err(e) = self.snapshot_balances(&baskets).await {
                warn!("余额快照失败: {}", e);
            }
        }

        Ok(())
    }

    async fn process_basket(&self, basket: &Basket) -> AppResult<()> {
        // a. 合并配置快照与过滤器；锚定价以篮子行为准（重锚会更新它）
        let filters = filter_service::get_filters(self.exchange.as_ref(), &basket.pair).await?;
        let mut cfg = GridConfig::from_json(&basket.config_json)?.with_filters(&filters);
        cfg.anchor_price_p0 = basket.anchor_price;

        // b. 拉取交易所实时状态
        let account = self.exchange.account_info().await?;
        let open_orders = self.exchange.open_orders(&basket.pair).await?;
        let last_price = self.exchange.current_price(&basket.pair).await?;

        // c. 同步近24小时成交
        self.sync_trades(basket).await?;

        // d. 读取成交历史并计算持仓
        let fills = self.fill_repo.find_by_basket(&basket.basket_id).await?;
        let position = summarize_position(&fills).position_base_qty();

        // e. 构建策略输入并求应有订单集
        let now_ms = now_millis();
        let state = StrategyState {
            basket_id: basket.basket_id.clone(),
            available_quote: account.free(&filters.quote_asset),
            available_base: account.free(&filters.base_asset),
            position_base_qty: position,
            fills: fills.iter().map(FillRecord::from).collect(),
            basket_created_at_ms: basket.created_at.timestamp_millis(),
        };
        let market = MarketView {
            last_trade_price: last_price,
        };
        let mut plan: GridPlan = plan_grid(&cfg, &state, &market, now_ms);

        // f. 空仓且双侧无计划时重锚，并以新锚价重算一次
        if plan.meta.reanchor_suggested && position.abs() < dust_threshold() {
            info!(
                "重锚: basket_id={}, old_anchor={}, new_anchor={}",
                basket.basket_id, cfg.anchor_price_p0, last_price
            );
            self.basket_repo
                .update_anchor_price(&basket.basket_id, last_price)
                .await?;
            cfg.anchor_price_p0 = last_price;
            plan = plan_grid(&cfg, &state, &market, now_ms);
        }

        // g. 对账：实有集合只取本篮子命名空间内的挂单
        let desired: Vec<_> = plan
            .buys
            .iter()
            .chain(plan.sells.iter())
            .cloned()
            .collect();
        let actual: Vec<_> = open_orders
            .into_iter()
            .filter(|o| {
                GridOrder::belongs_to_basket(&o.client_order_id, &basket.pair, &basket.basket_id)
            })
            .collect();
        let reconcile_plan = reconcile(&desired, &actual);
        info!(
            "对账: basket_id={}, cancel={}, create={}, unchanged={}, filled_levels={}, budget_left={}",
            basket.basket_id,
            reconcile_plan.counters.canceled,
            reconcile_plan.counters.created,
            reconcile_plan.counters.unchanged,
            plan.meta.filled_levels,
            plan.meta.remaining_quote_budget
        );

        // h. 系统状态门：stopped时只观察不执行
        if !self.gate.is_running().await? {
            info!(
                "系统状态门stopped，跳过执行: basket_id={}",
                basket.basket_id
            );
            return Ok(());
        }

        self.executor
            .apply_plan(
                self.exchange.as_ref(),
                &basket.pair,
                &basket.basket_id,
                &reconcile_plan,
                &filters,
            )
            .await?;
        Ok(())
    }

    /// 拉取近24小时成交并归属到已知订单
    ///
    /// 以交易所订单ID定位父订单，交易所成交ID去重；
    /// 无法归属的成交只告警不落库（归属不了会污染VWAP）。
    async fn sync_trades(&self, basket: &Basket) -> AppResult<()> {
        let since_ms = now_millis() - TRADE_SYNC_WINDOW_MS;
        let trades = self
            .exchange
            .my_trades(&basket.pair, Some(since_ms))
            .await?;

        for trade in trades {
            if self
                .fill_repo
                .exists_by_venue_trade_id(trade.trade_id)
                .await?
            {
                continue;
            }
            let order = match self
                .order_repo
                .find_by_venue_order_id(trade.venue_order_id)
                .await?
            {
                Some(order) => order,
                None => {
                    warn!(
                        "成交无法归属到已知订单，跳过: venue_trade_id={}, venue_order_id={}",
                        trade.trade_id, trade.venue_order_id
                    );
                    continue;
                }
            };
            if order.basket_id != basket.basket_id {
                continue;
            }

            let executed_at = Utc
                .timestamp_millis_opt(trade.executed_at_ms)
                .single()
                .unwrap_or_else(Utc::now);
            let fill = Fill {
                id: None,
                order_id: order.id.unwrap_or_default(),
                basket_id: order.basket_id.clone(),
                venue_trade_id: trade.trade_id,
                side: order.side,
                price: trade.price,
                qty: trade.qty,
                commission: trade.commission,
                commission_asset: trade.commission_asset,
                executed_at,
            };
            if self.fill_repo.insert_if_absent(&fill).await? {
                info!(
                    "同步成交: basket_id={}, client_order_id={}, price={}, qty={}",
                    basket.basket_id, order.client_order_id, fill.price, fill.qty
                );
                let filled_qty = self
                    .fill_repo
                    .sum_qty_by_order(order.id.unwrap_or_default())
                    .await?;
                self.order_repo
                    .update_fill_progress(&order.client_order_id, filled_qty, order.qty, executed_at)
                    .await?;
            }
        }

        Ok(())
    }

    /// 为每个活跃交易对写一行余额快照
    async fn snapshot_balances(&self, baskets: &[Basket]) -> AppResult<()> {
        let mut pairs: Vec<&str> = baskets.iter().map(|b| b.pair.as_str()).collect();
        pairs.sort_unstable();
        pairs.dedup();

        let account = self.exchange.account_info().await?;
        for pair in pairs {
            let filters = filter_service::get_filters(self.exchange.as_ref(), pair).await?;
            let last_price = self.exchange.current_price(pair).await?;
            let snapshot = AccountSnapshot::capture(
                pair,
                account.free(&filters.quote_asset),
                account.free(&filters.base_asset),
                last_price,
                Utc::now(),
            );
            self.snapshot_repo.insert(&snapshot).await?;
        }
        Ok(())
    }

    /// 手动建篮：以当前价或显式锚价创建新篮子
    pub async fn create_basket(
        &self,
        cfg: &GridConfig,
        anchor_override: Option<Decimal>,
    ) -> AppResult<Basket> {
        cfg.validate()?;
        let anchor = match anchor_override {
            Some(price) => price,
            None => self.exchange.current_price(&cfg.pair).await?,
        };
        let mut cfg_snapshot = cfg.clone();
        cfg_snapshot.anchor_price_p0 = anchor;

        let basket = Basket::new(
            &cfg.pair,
            anchor,
            serde_json::to_string(&cfg_snapshot)?,
            now_millis(),
        );
        self.basket_repo.save(&basket).await?;
        info!(
            "创建篮子: basket_id={}, pair={}, anchor={}",
            basket.basket_id, basket.pair, anchor
        );
        Ok(basket)
    }

    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}
