//! 交易所REST响应结构
//!
//! 价格和数量字段在线上以字符串传输，反序列化为Decimal避免精度损失。

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::trading::exchange::{
    AccountInfo, AssetBalance, CancelAck, OrderSide, PairFilters, VenueOrder, VenueTrade,
};

/// 交易所错误信封
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RawAccountInfo {
    pub balances: Vec<RawBalance>,
}

impl RawAccountInfo {
    pub fn into_account_info(self) -> AccountInfo {
        AccountInfo {
            balances: self
                .balances
                .into_iter()
                .map(|b| AssetBalance {
                    asset: b.asset,
                    free: b.free,
                    locked: b.locked,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
}

impl RawOrder {
    pub fn into_venue_order(self) -> AppResult<VenueOrder> {
        let side = OrderSide::from_str(&self.side).ok_or_else(|| AppError::Exchange {
            code: 0,
            msg: format!("unexpected order side: {}", self.side),
        })?;
        Ok(VenueOrder {
            venue_order_id: self.order_id,
            client_order_id: self.client_order_id,
            pair: self.symbol,
            side,
            order_type: self.order_type,
            price: self.price,
            orig_qty: self.orig_qty,
            executed_qty: self.executed_qty,
            status: self.status,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCancelAck {
    pub orig_client_order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub order_id: Option<i64>,
}

impl RawCancelAck {
    pub fn into_cancel_ack(self, requested_client_id: &str) -> CancelAck {
        CancelAck {
            client_order_id: self
                .orig_client_order_id
                .or(self.client_order_id)
                .unwrap_or_else(|| requested_client_id.to_string()),
            venue_order_id: self.order_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub symbol: String,
    pub id: i64,
    pub order_id: i64,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
}

impl RawTrade {
    pub fn into_venue_trade(self) -> VenueTrade {
        VenueTrade {
            trade_id: self.id,
            venue_order_id: self.order_id,
            pair: self.symbol,
            price: self.price,
            qty: self.qty,
            commission: self.commission,
            commission_asset: self.commission_asset,
            is_buyer: self.is_buyer,
            executed_at_ms: self.time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawPrice {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbolFilter {
    pub filter_type: String,
    pub tick_size: Option<Decimal>,
    pub step_size: Option<Decimal>,
    pub min_notional: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub filters: Vec<RawSymbolFilter>,
}

#[derive(Debug, Deserialize)]
pub struct RawExchangeInfo {
    pub symbols: Vec<RawSymbol>,
}

impl RawExchangeInfo {
    /// 提取指定交易对的过滤器，缺失任一关键过滤器报交易所错误
    pub fn into_pair_filters(self, pair: &str) -> AppResult<PairFilters> {
        let symbol = self
            .symbols
            .into_iter()
            .find(|s| s.symbol == pair)
            .ok_or_else(|| AppError::Exchange {
                code: 0,
                msg: format!("symbol {} missing from exchangeInfo", pair),
            })?;

        let mut tick_size = None;
        let mut lot_size = None;
        let mut min_notional = None;
        for f in &symbol.filters {
            match f.filter_type.as_str() {
                "PRICE_FILTER" => tick_size = f.tick_size,
                "LOT_SIZE" => lot_size = f.step_size,
                "NOTIONAL" | "MIN_NOTIONAL" => min_notional = f.min_notional,
                _ => {}
            }
        }

        Ok(PairFilters {
            pair: symbol.symbol,
            base_asset: symbol.base_asset,
            quote_asset: symbol.quote_asset,
            tick_size: tick_size.ok_or_else(|| AppError::Exchange {
                code: 0,
                msg: format!("{} missing PRICE_FILTER", pair),
            })?,
            lot_size: lot_size.ok_or_else(|| AppError::Exchange {
                code: 0,
                msg: format!("{} missing LOT_SIZE", pair),
            })?,
            min_notional: min_notional.unwrap_or(Decimal::ZERO),
        })
    }
}
