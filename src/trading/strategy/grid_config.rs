//! 网格配置
//!
//! 每个篮子创建时的配置快照，以JSON存入 `baskets.config_json`，
//! 未知键直接拒绝。加载时统一校验单位：档位跌幅为百分比
//! （-5表示0.95·P0），止盈参数与出场份额为小数。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::trading::exchange::PairFilters;

/// 跌破保护模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardStopMode {
    #[default]
    None,
    Hard,
    /// 主区间下方更稀疏的第二区间；当前未实现，行为等同none
    ExtendZone,
}

/// 挂单广度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceMode {
    #[default]
    AllUnfilled,
    OnlyNextK,
}

/// 重锚触发规则
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReanchorRules {
    /// 平仓比例触发阈值；已接线但当前不参与计算
    #[serde(default)]
    pub close_ratio: Decimal,

    /// 篮子存活时间上限（秒）
    pub time_ttl_s: i64,
}

/// 篮子配置快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub pair: String,

    /// 锚定价P0
    pub anchor_price_p0: Decimal,

    /// 档位跌幅序列（百分比，如[-5,-10,...,-30]）
    pub levels_pct: Vec<Decimal>,

    /// 各档资金权重，与levels_pct等长，和为1.0
    pub alloc_weights: Vec<Decimal>,

    /// 网格总投入上限（计价资产）
    pub max_grid_capital_quote: Decimal,

    /// 交易对过滤器，运行时由过滤器缓存合并进来
    #[serde(default)]
    pub tick_size: Decimal,
    #[serde(default)]
    pub lot_size: Decimal,
    #[serde(default)]
    pub min_notional: Decimal,

    /// 动态止盈曲线（小数）：TP = max(start − step·(n_filled−1), min)
    pub tp_start_pct: Decimal,
    pub tp_step_pct: Decimal,
    pub tp_min_pct: Decimal,

    /// TP2相对TP1的偏移（小数）
    pub tp2_delta_pct: Decimal,

    /// 出场份额，和为1.0
    pub tp1_share: Decimal,
    pub tp2_share: Decimal,
    pub trail_share: Decimal,

    /// 模拟追踪腿的回调价比例（小数）
    pub trailing_callback_pct: Decimal,

    pub hard_stop_mode: HardStopMode,
    #[serde(default)]
    pub hard_stop_pct: Decimal,

    pub place_mode: PlaceMode,
    #[serde(default)]
    pub k_next: usize,

    pub reanchor_rules: ReanchorRules,
}

/// 权重/份额求和的容差
fn sum_tolerance() -> Decimal {
    Decimal::new(1, 6)
}

impl GridConfig {
    /// 从JSON快照解析并校验
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: GridConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 合并交易对过滤器（tick/lot/min_notional以交易所为准）
    pub fn with_filters(mut self, filters: &PairFilters) -> Self {
        self.tick_size = filters.tick_size;
        self.lot_size = filters.lot_size;
        self.min_notional = filters.min_notional;
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut reasons: Vec<String> = Vec::new();
        let one = Decimal::ONE;

        if self.pair.is_empty()
            || !self
                .pair
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            reasons.push(format!("pair必须为大写字母数字: {:?}", self.pair));
        }
        if self.anchor_price_p0 <= Decimal::ZERO {
            reasons.push(format!("anchor_price_p0必须为正: {}", self.anchor_price_p0));
        }
        if self.max_grid_capital_quote <= Decimal::ZERO {
            reasons.push("max_grid_capital_quote必须为正".to_string());
        }

        if self.levels_pct.is_empty() {
            reasons.push("levels_pct不能为空".to_string());
        }
        if self.levels_pct.len() != self.alloc_weights.len() {
            reasons.push(format!(
                "levels_pct与alloc_weights长度不一致: {} vs {}",
                self.levels_pct.len(),
                self.alloc_weights.len()
            ));
        }

        // 单位检查：档位跌幅固定为百分比，绝对值小于1视为误传小数
        for pct in &self.levels_pct {
            if *pct >= Decimal::ZERO {
                reasons.push(format!("档位跌幅必须为负百分比: {}", pct));
            } else if pct.abs() < one {
                reasons.push(format!(
                    "档位跌幅疑似小数单位（应为百分比，如-5表示下跌5%）: {}",
                    pct
                ));
            } else if pct.abs() >= Decimal::from(100) {
                reasons.push(format!("档位跌幅超出范围: {}", pct));
            }
        }

        let weight_sum: Decimal = self.alloc_weights.iter().copied().sum();
        if !self.alloc_weights.is_empty() && (weight_sum - one).abs() > sum_tolerance() {
            reasons.push(format!("alloc_weights之和必须为1.0: {}", weight_sum));
        }
        for w in &self.alloc_weights {
            if *w <= Decimal::ZERO {
                reasons.push(format!("资金权重必须为正: {}", w));
            }
        }

        let share_sum = self.tp1_share + self.tp2_share + self.trail_share;
        if (share_sum - one).abs() > sum_tolerance() {
            reasons.push(format!("出场份额之和必须为1.0: {}", share_sum));
        }
        for (name, share) in [
            ("tp1_share", self.tp1_share),
            ("tp2_share", self.tp2_share),
            ("trail_share", self.trail_share),
        ] {
            if share < Decimal::ZERO {
                reasons.push(format!("{}不能为负: {}", name, share));
            }
        }

        // 止盈参数为小数单位
        for (name, v) in [
            ("tp_start_pct", self.tp_start_pct),
            ("tp_min_pct", self.tp_min_pct),
            ("trailing_callback_pct", self.trailing_callback_pct),
        ] {
            if v <= Decimal::ZERO || v >= one {
                reasons.push(format!("{}必须在(0,1)区间（小数单位）: {}", name, v));
            }
        }
        if self.tp_step_pct < Decimal::ZERO || self.tp_step_pct >= one {
            reasons.push(format!("tp_step_pct必须在[0,1)区间: {}", self.tp_step_pct));
        }
        if self.tp2_delta_pct < Decimal::ZERO || self.tp2_delta_pct >= one {
            reasons.push(format!("tp2_delta_pct必须在[0,1)区间: {}", self.tp2_delta_pct));
        }
        if self.tp_min_pct > self.tp_start_pct {
            reasons.push(format!(
                "tp_min_pct不能大于tp_start_pct: {} > {}",
                self.tp_min_pct, self.tp_start_pct
            ));
        }

        if self.hard_stop_mode == HardStopMode::Hard
            && (self.hard_stop_pct <= Decimal::ZERO || self.hard_stop_pct >= one)
        {
            reasons.push(format!(
                "hard模式下hard_stop_pct必须在(0,1)区间: {}",
                self.hard_stop_pct
            ));
        }
        if self.place_mode == PlaceMode::OnlyNextK && self.k_next == 0 {
            reasons.push("only_next_k模式下k_next必须≥1".to_string());
        }
        if self.reanchor_rules.time_ttl_s < 0 {
            reasons.push(format!(
                "time_ttl_s不能为负: {}",
                self.reanchor_rules.time_ttl_s
            ));
        }
        if self.reanchor_rules.close_ratio < Decimal::ZERO {
            reasons.push(format!(
                "close_ratio不能为负: {}",
                self.reanchor_rules.close_ratio
            ));
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(reasons.join("; ")))
        }
    }
}
