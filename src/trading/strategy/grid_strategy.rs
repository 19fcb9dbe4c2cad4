//! 网格策略
//!
//! 纯函数：由配置、成交历史与最新价计算“应有”订单集。
//! 不做任何I/O，不读系统时钟（now由调用方传入），同一输入恒得同一输出。
//!
//! 算法（迭代实现）：
//! 1. 铺设档位：price_i = round_down(P0·(1+pct_i/100), tick)，
//!    qty_i = round_down(capital·w_i/price_i, lot)，名义价值不足的档位丢弃
//! 2. 遍历买入成交求VWAP；成交价落在某档位±tick内即视该档已成交
//! 3. 跌破保护：hard模式剔除止损线下方档位；价格已跌穿止损线时停止买入
//! 4. 买入计划：only_next_k按价格从高到低取现价下方前k档；
//!    每档同时受可用余额与剩余预算约束
//! 5. 卖出计划：持仓>0且VWAP可得时，按动态TP铺TP1/TP2/TRAIL三腿
//! 6. 两侧计划均为空时给出重锚建议（仅建议，是否执行由调度循环决定）

use rust_decimal::Decimal;

use crate::trading::exchange::OrderSide;
use crate::trading::model::fill::Fill;
use crate::trading::model::order::GridOrder;
use crate::trading::strategy::grid_config::{GridConfig, HardStopMode, PlaceMode};
use crate::trading::strategy::numeric::{eps, round_down, round_up};

/// 策略输入的成交视图（与存储实体解耦，便于构造测试输入）
#[derive(Debug, Clone)]
pub struct FillRecord {
    pub side: OrderSide,
    pub price: Decimal,
    pub qty: Decimal,
}

impl From<&Fill> for FillRecord {
    fn from(fill: &Fill) -> Self {
        Self {
            side: fill.side,
            price: fill.price,
            qty: fill.qty,
        }
    }
}

/// 策略输入：篮子侧状态
#[derive(Debug, Clone)]
pub struct StrategyState {
    /// 篮子短标识（≤22字符，嵌入客户端订单ID）
    pub basket_id: String,
    pub available_quote: Decimal,
    pub available_base: Decimal,
    pub position_base_qty: Decimal,
    pub fills: Vec<FillRecord>,
    pub basket_created_at_ms: i64,
}

/// 策略输入：市场侧状态
#[derive(Debug, Clone, Copy)]
pub struct MarketView {
    pub last_trade_price: Decimal,
}

/// 应有订单
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub side: OrderSide,
    pub order_type: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub client_order_id: String,
}

impl OrderSpec {
    fn limit(side: OrderSide, price: Decimal, qty: Decimal, client_order_id: String) -> Self {
        Self {
            side,
            order_type: "LIMIT".to_string(),
            price,
            qty,
            client_order_id,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}

/// 策略元信息输出
#[derive(Debug, Clone)]
pub struct PlanMeta {
    pub basket_id: String,
    pub avg_price: Option<Decimal>,
    pub filled_levels: usize,
    pub planned_levels: usize,
    pub remaining_quote_budget: Decimal,
    pub reanchor_suggested: bool,
}

/// 策略输出：应有订单集
#[derive(Debug, Clone)]
pub struct GridPlan {
    pub buys: Vec<OrderSpec>,
    pub sells: Vec<OrderSpec>,
    pub meta: PlanMeta,
}

#[derive(Debug, Clone)]
struct Level {
    price: Decimal,
    qty: Decimal,
    client_order_id: String,
    filled: bool,
}

/// 持仓尘埃阈值：低于该数量视为空仓
pub fn dust_threshold() -> Decimal {
    Decimal::new(1, 5)
}

/// 计算应有订单集
pub fn plan_grid(
    cfg: &GridConfig,
    state: &StrategyState,
    market: &MarketView,
    now_ms: i64,
) -> GridPlan {
    let hundred = Decimal::from(100);

    // 1. 铺设档位
    let mut levels: Vec<Level> = Vec::with_capacity(cfg.levels_pct.len());
    for (i, (pct, weight)) in cfg
        .levels_pct
        .iter()
        .zip(cfg.alloc_weights.iter())
        .enumerate()
    {
        let price = round_down(
            cfg.anchor_price_p0 * (Decimal::ONE + *pct / hundred),
            cfg.tick_size,
        );
        if price <= Decimal::ZERO {
            continue;
        }
        let qty = round_down(
            cfg.max_grid_capital_quote * *weight / price,
            cfg.lot_size,
        );
        if qty <= Decimal::ZERO || price * qty < cfg.min_notional {
            continue;
        }
        levels.push(Level {
            price,
            qty,
            client_order_id: GridOrder::level_client_id(&cfg.pair, &state.basket_id, i + 1),
            filled: false,
        });
    }
    let planned_levels = levels.len();

    // 2. VWAP与已成交档位识别
    let mut buy_qty_total = Decimal::ZERO;
    let mut buy_quote_total = Decimal::ZERO;
    for fill in state.fills.iter().filter(|f| f.side == OrderSide::Buy) {
        buy_qty_total += fill.qty;
        buy_quote_total += fill.price * fill.qty;
        let fill_tolerance = cfg.tick_size + eps();
        for level in levels.iter_mut() {
            if (fill.price - level.price).abs() <= fill_tolerance {
                level.filled = true;
            }
        }
    }
    let avg_price = if buy_qty_total > Decimal::ZERO {
        Some(buy_quote_total / buy_qty_total)
    } else {
        None
    };
    let n_filled = levels.iter().filter(|l| l.filled).count();

    // 3. 跌破保护
    let mut market_below_stop = false;
    match cfg.hard_stop_mode {
        HardStopMode::Hard => {
            let stop_price = cfg.anchor_price_p0 * (Decimal::ONE - cfg.hard_stop_pct);
            levels.retain(|l| l.price >= stop_price);
            market_below_stop = market.last_trade_price < stop_price;
        }
        // TODO: extend_zone的稀疏第二区间尚未定义，当前与none等价
        HardStopMode::ExtendZone => {}
        HardStopMode::None => {}
    }

    // 4. 买入计划
    let mut candidates: Vec<&Level> = if market_below_stop {
        Vec::new()
    } else {
        levels.iter().filter(|l| !l.filled).collect()
    };
    if cfg.place_mode == PlaceMode::OnlyNextK {
        candidates.sort_by(|a, b| b.price.cmp(&a.price));
        candidates.retain(|l| l.price <= market.last_trade_price);
        candidates.truncate(cfg.k_next);
    }

    let mut remaining_budget = cfg.max_grid_capital_quote - buy_quote_total;
    let mut available_quote = state.available_quote;
    let mut buys: Vec<OrderSpec> = Vec::new();
    for level in candidates {
        let notional = level.price * level.qty;
        if notional <= available_quote && notional <= remaining_budget {
            available_quote -= notional;
            remaining_budget -= notional;
            buys.push(OrderSpec::limit(
                OrderSide::Buy,
                level.price,
                level.qty,
                level.client_order_id.clone(),
            ));
        }
    }

    // 5. 卖出计划
    let mut sells: Vec<OrderSpec> = Vec::new();
    if state.position_base_qty > Decimal::ZERO {
        if let Some(avg) = avg_price {
            let overshoot = Decimal::from(n_filled.saturating_sub(1));
            let tp = (cfg.tp_start_pct - cfg.tp_step_pct * overshoot).max(cfg.tp_min_pct);

            let pos = state.position_base_qty;
            let q1 = round_down(pos * cfg.tp1_share, cfg.lot_size);
            let q2 = round_down(pos * cfg.tp2_share, cfg.lot_size);
            let q3 = round_down(pos - q1 - q2, cfg.lot_size);

            let legs = [
                ("TP1", round_up(avg * (Decimal::ONE + tp), cfg.tick_size), q1),
                (
                    "TP2",
                    round_up(avg * (Decimal::ONE + tp + cfg.tp2_delta_pct), cfg.tick_size),
                    q2,
                ),
                (
                    "TRAIL",
                    round_up(
                        avg * (Decimal::ONE + cfg.trailing_callback_pct),
                        cfg.tick_size,
                    ),
                    q3,
                ),
            ];
            for (slot, price, qty) in legs {
                if qty > Decimal::ZERO {
                    sells.push(OrderSpec::limit(
                        OrderSide::Sell,
                        price,
                        qty,
                        GridOrder::sell_client_id(&cfg.pair, &state.basket_id, slot),
                    ));
                }
            }
        }
    }

    // 6. 重锚建议
    let basket_age_s = (now_ms - state.basket_created_at_ms) / 1000;
    let reanchor_suggested = buys.is_empty()
        && sells.is_empty()
        && (state.position_base_qty.abs() < dust_threshold()
            || basket_age_s > cfg.reanchor_rules.time_ttl_s);

    GridPlan {
        buys,
        sells,
        meta: PlanMeta {
            basket_id: state.basket_id.clone(),
            avg_price,
            filled_levels: n_filled,
            planned_levels,
            remaining_quote_budget: remaining_budget,
            reanchor_suggested,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::strategy::grid_config::ReanchorRules;
    use crate::trading::strategy::numeric::is_step_aligned;
    use rust_decimal_macros::dec;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn config() -> GridConfig {
        GridConfig {
            pair: "SOLUSDC".to_string(),
            anchor_price_p0: dec!(150.000),
            levels_pct: vec![
                dec!(-5),
                dec!(-10),
                dec!(-15),
                dec!(-20),
                dec!(-25),
                dec!(-30),
            ],
            alloc_weights: vec![
                dec!(0.08),
                dec!(0.12),
                dec!(0.15),
                dec!(0.18),
                dec!(0.22),
                dec!(0.25),
            ],
            max_grid_capital_quote: dec!(1000),
            tick_size: dec!(0.001),
            lot_size: dec!(0.01),
            min_notional: dec!(5.0),
            tp_start_pct: dec!(0.012),
            tp_step_pct: dec!(0.0015),
            tp_min_pct: dec!(0.003),
            tp2_delta_pct: dec!(0.008),
            tp1_share: dec!(0.4),
            tp2_share: dec!(0.35),
            trail_share: dec!(0.25),
            trailing_callback_pct: dec!(0.02),
            hard_stop_mode: HardStopMode::None,
            hard_stop_pct: Decimal::ZERO,
            place_mode: PlaceMode::OnlyNextK,
            k_next: 2,
            reanchor_rules: ReanchorRules {
                close_ratio: Decimal::ZERO,
                time_ttl_s: 86_400,
            },
        }
    }

    fn empty_state() -> StrategyState {
        StrategyState {
            basket_id: "m1abc2d3ef00".to_string(),
            available_quote: dec!(10000),
            available_base: Decimal::ZERO,
            position_base_qty: Decimal::ZERO,
            fills: Vec::new(),
            basket_created_at_ms: NOW_MS,
        }
    }

    fn buy_fill(price: Decimal, qty: Decimal) -> FillRecord {
        FillRecord {
            side: OrderSide::Buy,
            price,
            qty,
        }
    }

    /// 场景S1：六档网格，无成交，only_next_k=2
    #[test]
    fn test_s1_fresh_grid_places_next_two_levels() {
        let plan = plan_grid(
            &config(),
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );

        assert_eq!(plan.buys.len(), 2);
        assert_eq!(plan.buys[0].price, dec!(142.500));
        assert_eq!(plan.buys[0].qty, dec!(0.56));
        assert_eq!(plan.buys[0].client_order_id, "SOLUSDC_m1abc2d3ef00_B_1");
        assert_eq!(plan.buys[1].price, dec!(135.000));
        assert_eq!(plan.buys[1].qty, dec!(0.88));
        assert_eq!(plan.buys[1].client_order_id, "SOLUSDC_m1abc2d3ef00_B_2");

        assert!(plan.sells.is_empty());
        assert_eq!(plan.meta.planned_levels, 6);
        assert_eq!(plan.meta.filled_levels, 0);
        assert!(!plan.meta.reanchor_suggested);
        assert!(plan.meta.avg_price.is_none());
    }

    /// 场景S2：前三档已成交，动态止盈三腿
    #[test]
    fn test_s2_three_levels_filled_dynamic_tp() {
        let mut state = empty_state();
        state.fills = vec![
            buy_fill(dec!(142.500), dec!(0.56)),
            buy_fill(dec!(135.000), dec!(0.88)),
            buy_fill(dec!(127.500), dec!(1.17)),
        ];
        state.position_base_qty = dec!(2.61);

        let plan = plan_grid(
            &config(),
            &state,
            &MarketView {
                last_trade_price: dec!(130),
            },
            NOW_MS,
        );

        assert_eq!(plan.meta.filled_levels, 3);
        // avg = 347.775 / 2.61 ≈ 133.2471
        let avg = plan.meta.avg_price.unwrap();
        assert!((avg - dec!(133.2471)).abs() < dec!(0.0001));

        // n_filled=3 ⇒ TP = 0.012 − 0.0015·2 = 0.009
        assert_eq!(plan.sells.len(), 3);
        let tp1 = &plan.sells[0];
        assert_eq!(tp1.client_order_id, "SOLUSDC_m1abc2d3ef00_S_TP1");
        assert_eq!(tp1.price, dec!(134.447));
        assert_eq!(tp1.qty, dec!(1.04));

        let tp2 = &plan.sells[1];
        assert_eq!(tp2.client_order_id, "SOLUSDC_m1abc2d3ef00_S_TP2");
        assert_eq!(tp2.price, dec!(135.513));
        assert_eq!(tp2.qty, dec!(0.91));

        let trail = &plan.sells[2];
        assert_eq!(trail.client_order_id, "SOLUSDC_m1abc2d3ef00_S_TRAIL");
        // round_up(avg · 1.02, 0.001)
        assert_eq!(trail.price, dec!(135.913));
        assert_eq!(trail.qty, dec!(0.66));
    }

    /// 场景S6：双侧计划为空且空仓时给出重锚建议
    #[test]
    fn test_s6_reanchor_suggested_when_idle() {
        let mut cfg = config();
        // 现价跌破全部档位下方，only_next_k无候选
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(90),
            },
            NOW_MS,
        );
        assert!(plan.buys.is_empty());
        assert!(plan.sells.is_empty());
        assert!(plan.meta.reanchor_suggested);

        // 重锚后以新锚价重新铺设
        cfg.anchor_price_p0 = dec!(90);
        let replanned = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(90),
            },
            NOW_MS,
        );
        assert_eq!(replanned.buys.len(), 2);
        assert_eq!(replanned.buys[0].price, dec!(85.500));
        assert!(!replanned.meta.reanchor_suggested);
    }

    /// 性质2/3：预算约束与步长对齐
    #[test]
    fn test_budget_and_step_alignment() {
        let mut cfg = config();
        cfg.place_mode = PlaceMode::AllUnfilled;
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );

        let total: Decimal = plan.buys.iter().map(|b| b.notional()).sum();
        assert!(total <= cfg.max_grid_capital_quote * (Decimal::ONE + dec!(0.000001)));

        for buy in &plan.buys {
            assert!(is_step_aligned(buy.price, cfg.tick_size));
            assert!(is_step_aligned(buy.qty, cfg.lot_size));
        }
        assert_eq!(plan.buys.len(), 6);
    }

    /// 余额不足时跳过买不起的档位
    #[test]
    fn test_available_balance_constrains_buys() {
        let mut state = empty_state();
        // 只够第一档 (142.5·0.56 = 79.8)
        state.available_quote = dec!(100);
        let plan = plan_grid(
            &config(),
            &state,
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );
        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.buys[0].price, dec!(142.500));
    }

    /// 性质4：三腿数量之和不超过持仓，亏空不超过3个lot
    #[test]
    fn test_sell_quantities_bounded_by_position() {
        let mut state = empty_state();
        state.fills = vec![buy_fill(dec!(142.500), dec!(1.2345))];
        state.position_base_qty = dec!(1.2345);

        let plan = plan_grid(
            &config(),
            &state,
            &MarketView {
                last_trade_price: dec!(140),
            },
            NOW_MS,
        );

        let total: Decimal = plan.sells.iter().map(|s| s.qty).sum();
        assert!(total <= state.position_base_qty + eps());
        assert!(total >= state.position_base_qty - dec!(0.01) * dec!(3));
    }

    /// 性质5：only_next_k限制买单数量
    #[test]
    fn test_only_next_k_caps_buy_count() {
        let mut cfg = config();
        cfg.k_next = 3;
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(120.5),
            },
            NOW_MS,
        );
        // 现价120.5下方的档位: 120, 112.5, 105
        assert!(plan.buys.len() <= 3);
        assert_eq!(plan.buys[0].price, dec!(120.000));
        for buy in &plan.buys {
            assert!(buy.price <= dec!(120.5));
        }
    }

    /// 性质9：空仓时无卖单
    #[test]
    fn test_no_position_no_sells() {
        let plan = plan_grid(
            &config(),
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );
        assert!(plan.sells.is_empty());
    }

    /// 性质10：TP收敛到下限
    #[test]
    fn test_tp_converges_to_minimum() {
        let mut cfg = config();
        cfg.levels_pct = (1..=20).map(|i| Decimal::from(-i)).collect();
        cfg.alloc_weights = vec![dec!(0.05); 20];
        cfg.place_mode = PlaceMode::AllUnfilled;

        let mut state = empty_state();
        // 全部20档成交
        state.fills = (1..=20)
            .map(|i| {
                let price = round_down(
                    dec!(150) * (Decimal::ONE - Decimal::from(i) / dec!(100)),
                    dec!(0.001),
                );
                buy_fill(price, dec!(0.33))
            })
            .collect();
        state.position_base_qty = dec!(6.60);

        let plan = plan_grid(
            &cfg,
            &state,
            &MarketView {
                last_trade_price: dec!(120),
            },
            NOW_MS,
        );
        assert_eq!(plan.meta.filled_levels, 20);

        // TP = max(0.012 − 0.0015·19, 0.003) = 0.003
        let avg = plan.meta.avg_price.unwrap();
        let expected_tp1 = round_up(avg * (Decimal::ONE + dec!(0.003)), dec!(0.001));
        assert_eq!(plan.sells[0].price, expected_tp1);
    }

    /// 性质11：hard模式下价格跌破止损线则不再买入
    #[test]
    fn test_hard_stop_blocks_buys_below_stop() {
        let mut cfg = config();
        cfg.hard_stop_mode = HardStopMode::Hard;
        cfg.hard_stop_pct = dec!(0.20);
        cfg.place_mode = PlaceMode::AllUnfilled;

        // 止损线 150·0.8 = 120；现价118在线下
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(118),
            },
            NOW_MS,
        );
        assert!(plan.buys.is_empty());

        // 现价在线上时，线下档位(-25%,-30%)被剔除，其余保留
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );
        assert_eq!(plan.buys.len(), 4);
        for buy in &plan.buys {
            assert!(buy.price >= dec!(120));
        }
    }

    /// 低于最小名义价值的档位被丢弃
    #[test]
    fn test_min_notional_discards_levels() {
        let mut cfg = config();
        cfg.max_grid_capital_quote = dec!(60);
        cfg.place_mode = PlaceMode::AllUnfilled;
        // 60·0.08 = 4.8 < 5.0 ⇒ 第一档丢弃
        let plan = plan_grid(
            &cfg,
            &empty_state(),
            &MarketView {
                last_trade_price: dec!(148),
            },
            NOW_MS,
        );
        assert!(plan.meta.planned_levels < 6);
        for buy in &plan.buys {
            assert!(buy.notional() >= dec!(5.0) - eps());
        }
    }

    /// 基于TTL的重锚建议：持仓非零但篮子超龄且无计划
    #[test]
    fn test_reanchor_on_ttl_expiry() {
        let mut state = empty_state();
        state.basket_created_at_ms = NOW_MS - 90_000_000; // 25小时前
        state.position_base_qty = dec!(0.5);
        // 无VWAP可得（无成交记录）⇒ 无卖单；现价在所有档位下方 ⇒ 无买单
        let plan = plan_grid(
            &config(),
            &state,
            &MarketView {
                last_trade_price: dec!(90),
            },
            NOW_MS,
        );
        assert!(plan.buys.is_empty());
        assert!(plan.sells.is_empty());
        assert!(plan.meta.reanchor_suggested);
    }

    /// 已成交档位不再重复挂买单
    #[test]
    fn test_filled_levels_excluded_from_buys() {
        let mut state = empty_state();
        state.fills = vec![buy_fill(dec!(142.500), dec!(0.56))];
        state.position_base_qty = dec!(0.56);

        let plan = plan_grid(
            &config(),
            &state,
            &MarketView {
                last_trade_price: dec!(141),
            },
            NOW_MS,
        );
        for buy in &plan.buys {
            assert_ne!(buy.client_order_id, "SOLUSDC_m1abc2d3ef00_B_1");
        }
        assert_eq!(plan.meta.filled_levels, 1);
    }
}
