//! 交易对过滤器缓存与订单校验
//!
//! 过滤器（tick/lot/最小名义价值）进程级缓存，TTL 24小时，
//! 未命中或过期时经交易所接口按需拉取。校验为本地尽力而为，
//! 余额充足性最终由交易所复核。

use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::trading::exchange::{ExchangeApi, PairFilters};
use crate::trading::model::order::MAX_CLIENT_ORDER_ID_LEN;
use crate::trading::strategy::grid_strategy::OrderSpec;
use crate::trading::strategy::numeric::is_step_aligned;

const FILTER_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone)]
struct CachedFilters {
    filters: PairFilters,
    fetched_at: Instant,
}

static FILTER_CACHE: Lazy<DashMap<String, CachedFilters>> = Lazy::new(DashMap::new);

/// 获取交易对过滤器；缓存过期或未命中时重新拉取
pub async fn get_filters(exchange: &dyn ExchangeApi, pair: &str) -> AppResult<PairFilters> {
    if let Some(entry) = FILTER_CACHE.get(pair) {
        if entry.fetched_at.elapsed() < FILTER_TTL {
            return Ok(entry.filters.clone());
        }
    }

    debug!("过滤器缓存未命中，拉取exchange_info: pair={}", pair);
    let filters = exchange.exchange_info(pair).await?;
    FILTER_CACHE.insert(
        pair.to_string(),
        CachedFilters {
            filters: filters.clone(),
            fetched_at: Instant::now(),
        },
    );
    Ok(filters)
}

/// 测试与重载场景下清空缓存
pub fn invalidate(pair: &str) {
    FILTER_CACHE.remove(pair);
}

/// 校验订单是否满足交易对约束
///
/// 检查项：价格对齐tick、数量对齐lot、名义价值≥下限、
/// 客户端订单ID字符集与长度。
pub fn validate_spec(spec: &OrderSpec, filters: &PairFilters) -> AppResult<()> {
    let mut reasons: Vec<String> = Vec::new();

    if !is_step_aligned(spec.price, filters.tick_size) {
        reasons.push(format!(
            "价格{}未对齐tick_size {}",
            spec.price, filters.tick_size
        ));
    }
    if !is_step_aligned(spec.qty, filters.lot_size) {
        reasons.push(format!(
            "数量{}未对齐lot_size {}",
            spec.qty, filters.lot_size
        ));
    }
    if spec.notional() < filters.min_notional {
        reasons.push(format!(
            "名义价值{}低于下限{}",
            spec.notional(),
            filters.min_notional
        ));
    }
    if spec.client_order_id.len() > MAX_CLIENT_ORDER_ID_LEN {
        reasons.push(format!(
            "客户端订单ID超长({} > {}): {}",
            spec.client_order_id.len(),
            MAX_CLIENT_ORDER_ID_LEN,
            spec.client_order_id
        ));
    }
    if !spec
        .client_order_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        reasons.push(format!("客户端订单ID含非法字符: {}", spec.client_order_id));
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(reasons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::exchange::{
        AccountInfo, CancelAck, OrderSide, PlaceOrderRequest, VenueOrder, VenueTrade,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockExchange {
        fetch_count: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ExchangeApi for MockExchange {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn account_info(&self) -> AppResult<AccountInfo> {
            Ok(AccountInfo::default())
        }

        async fn open_orders(&self, _pair: &str) -> AppResult<Vec<VenueOrder>> {
            Ok(Vec::new())
        }

        async fn place_order(&self, _req: &PlaceOrderRequest) -> AppResult<VenueOrder> {
            Err(AppError::Config("mock不支持下单".to_string()))
        }

        async fn cancel_order(&self, _pair: &str, _client_order_id: &str) -> AppResult<CancelAck> {
            Err(AppError::Config("mock不支持撤单".to_string()))
        }

        async fn current_price(&self, _pair: &str) -> AppResult<Decimal> {
            Ok(Decimal::ONE)
        }

        async fn my_trades(
            &self,
            _pair: &str,
            _since_ms: Option<i64>,
        ) -> AppResult<Vec<VenueTrade>> {
            Ok(Vec::new())
        }

        async fn exchange_info(&self, pair: &str) -> AppResult<PairFilters> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(PairFilters {
                pair: pair.to_string(),
                base_asset: "SOL".to_string(),
                quote_asset: "USDC".to_string(),
                tick_size: dec!(0.001),
                lot_size: dec!(0.01),
                min_notional: dec!(5.0),
            })
        }
    }

    #[tokio::test]
    async fn test_cache_hits_within_ttl() {
        let exchange = MockExchange {
            fetch_count: AtomicU32::new(0),
        };
        // 测试间共享进程级缓存，用独立交易对名隔离
        let pair = "CACHETESTUSDC";
        invalidate(pair);

        let first = get_filters(&exchange, pair).await.unwrap();
        let second = get_filters(&exchange, pair).await.unwrap();
        assert_eq!(first.tick_size, second.tick_size);
        assert_eq!(exchange.fetch_count.load(Ordering::SeqCst), 1);

        invalidate(pair);
        get_filters(&exchange, pair).await.unwrap();
        assert_eq!(exchange.fetch_count.load(Ordering::SeqCst), 2);
    }

    fn filters() -> PairFilters {
        PairFilters {
            pair: "SOLUSDC".to_string(),
            base_asset: "SOL".to_string(),
            quote_asset: "USDC".to_string(),
            tick_size: dec!(0.001),
            lot_size: dec!(0.01),
            min_notional: dec!(5.0),
        }
    }

    fn spec(price: Decimal, qty: Decimal) -> OrderSpec {
        OrderSpec {
            side: OrderSide::Buy,
            order_type: "LIMIT".to_string(),
            price,
            qty,
            client_order_id: "SOLUSDC_m1abc2d3ef00_B_1".to_string(),
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        validate_spec(&spec(dec!(142.500), dec!(0.56)), &filters()).unwrap();
    }

    #[test]
    fn test_misaligned_price_rejected() {
        let err = validate_spec(&spec(dec!(142.5005), dec!(0.56)), &filters()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_misaligned_qty_rejected() {
        assert!(validate_spec(&spec(dec!(142.500), dec!(0.565)), &filters()).is_err());
    }

    #[test]
    fn test_below_min_notional_rejected() {
        // 142.5·0.03 = 4.275 < 5.0
        assert!(validate_spec(&spec(dec!(142.500), dec!(0.03)), &filters()).is_err());
    }

    #[test]
    fn test_overlong_client_id_rejected() {
        let mut bad = spec(dec!(142.500), dec!(0.56));
        bad.client_order_id = format!("SOLUSDC_{}_B_1", "x".repeat(30));
        assert!(validate_spec(&bad, &filters()).is_err());
    }

    #[test]
    fn test_illegal_characters_rejected() {
        let mut bad = spec(dec!(142.500), dec!(0.56));
        bad.client_order_id = "SOLUSDC_m1abc-2d3_B_1".to_string();
        assert!(validate_spec(&bad, &filters()).is_err());
    }

    #[test]
    fn test_multiple_reasons_collected() {
        let err = validate_spec(&spec(dec!(142.5005), dec!(0.565)), &filters()).unwrap_err();
        match err {
            AppError::Validation(reasons) => assert_eq!(reasons.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
