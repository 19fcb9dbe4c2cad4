//! 交易所统一接口
//!
//! 将具体交易所REST实现适配为统一trait，执行器、调度循环和
//! 紧急平仓只依赖该接口，测试时可注入模拟交易所。

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }

    /// 客户端订单ID中的单字符段（B/S）
    pub fn id_tag(&self) -> &'static str {
        match self {
            OrderSide::Buy => "B",
            OrderSide::Sell => "S",
        }
    }
}

/// 单一资产余额
#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// 账户余额信息
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

impl AccountInfo {
    /// 指定资产的可用余额，未持有返回0
    pub fn free(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

/// 交易所侧观察到的订单
#[derive(Debug, Clone)]
pub struct VenueOrder {
    pub venue_order_id: i64,
    pub client_order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub order_type: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub status: String,
}

/// 下单请求
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub order_type: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub client_order_id: String,
    pub time_in_force: String,
}

impl PlaceOrderRequest {
    /// 构建限价GTC订单请求
    pub fn limit_gtc(
        pair: &str,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
        client_order_id: &str,
    ) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            order_type: "LIMIT".to_string(),
            price,
            qty,
            client_order_id: client_order_id.to_string(),
            time_in_force: "GTC".to_string(),
        }
    }
}

/// 撤单确认
#[derive(Debug, Clone)]
pub struct CancelAck {
    pub client_order_id: String,
    pub venue_order_id: Option<i64>,
}

/// 成交记录
#[derive(Debug, Clone)]
pub struct VenueTrade {
    pub trade_id: i64,
    pub venue_order_id: i64,
    pub pair: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub is_buyer: bool,
    pub executed_at_ms: i64,
}

/// 交易对过滤器：价格步长、数量步长、最小名义价值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairFilters {
    pub pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub min_notional: Decimal,
}

/// 交易所统一接口
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    fn name(&self) -> &'static str;

    /// 账户余额
    async fn account_info(&self) -> AppResult<AccountInfo>;

    /// 交易对当前挂单
    async fn open_orders(&self, pair: &str) -> AppResult<Vec<VenueOrder>>;

    /// 下单
    async fn place_order(&self, req: &PlaceOrderRequest) -> AppResult<VenueOrder>;

    /// 按客户端订单ID撤单
    async fn cancel_order(&self, pair: &str, client_order_id: &str) -> AppResult<CancelAck>;

    /// 最新成交价
    async fn current_price(&self, pair: &str) -> AppResult<Decimal>;

    /// 成交历史（since_ms为起始毫秒时间戳）
    async fn my_trades(&self, pair: &str, since_ms: Option<i64>) -> AppResult<Vec<VenueTrade>>;

    /// 交易对过滤器
    async fn exchange_info(&self, pair: &str) -> AppResult<PairFilters>;
}
