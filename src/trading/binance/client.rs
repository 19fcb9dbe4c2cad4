//! 签名REST客户端
//!
//! 认证请求附加毫秒时间戳与接收窗口，对查询串做HMAC-SHA256签名
//! （hex编码），API key走请求头。每次外发请求消耗1个限流令牌；
//! 瞬时失败（429/5xx/解码失败/传输错误）指数退避重试，最多3次。

use std::env;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::app_config::env::env_flag;
use crate::error::{AppError, AppResult};
use crate::time_util::now_millis;
use crate::trading::binance::models::{
    ErrorResponse, RawAccountInfo, RawCancelAck, RawExchangeInfo, RawOrder, RawPrice, RawTrade,
};
use crate::trading::binance::rate_limit::TokenBucket;
use crate::trading::exchange::{
    AccountInfo, CancelAck, ExchangeApi, PairFilters, PlaceOrderRequest, VenueOrder, VenueTrade,
};

const MAINNET_BASE_URL: &str = "https://api.binance.com";
const TESTNET_BASE_URL: &str = "https://testnet.binance.vision";

/// 接收窗口60秒
const RECV_WINDOW_MS: i64 = 60_000;
const MAX_ATTEMPTS: u32 = 3;

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceClient {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    bucket: TokenBucket,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> AppResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            api_key,
            api_secret,
            base_url,
            bucket: TokenBucket::venue_default(),
        })
    }

    /// 从环境变量构建：BINANCE_API_KEY / BINANCE_API_SECRET / BINANCE_TESTNET
    pub fn from_env() -> AppResult<Self> {
        let api_key = env::var("BINANCE_API_KEY")
            .map_err(|_| AppError::Config("BINANCE_API_KEY must be set".to_string()))?;
        let api_secret = env::var("BINANCE_API_SECRET")
            .map_err(|_| AppError::Config("BINANCE_API_SECRET must be set".to_string()))?;
        let base_url = if env_flag("BINANCE_TESTNET", false) {
            TESTNET_BASE_URL.to_string()
        } else {
            MAINNET_BASE_URL.to_string()
        };
        Self::new(api_key, api_secret, base_url)
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 发起请求并按错误分类重试
    ///
    /// signed=true时每次尝试重新取时间戳并重签名，避免重试时签名过期。
    async fn send_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> AppResult<T> {
        let mut last_transient: Option<AppError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            self.bucket.acquire(1).await;

            let query = if signed {
                let mut all: Vec<(&str, String)> = params.to_vec();
                all.push(("recvWindow", RECV_WINDOW_MS.to_string()));
                all.push(("timestamp", now_millis().to_string()));
                let unsigned = Self::build_query(&all);
                let signature = self.sign(&unsigned);
                format!("{}&signature={}", unsigned, signature)
            } else {
                Self::build_query(params)
            };

            let url = if query.is_empty() {
                format!("{}{}", self.base_url, path)
            } else {
                format!("{}{}?{}", self.base_url, path, query)
            };

            let mut builder = self.http.request(method.clone(), &url);
            if signed {
                builder = builder.header("X-MBX-APIKEY", &self.api_key);
            }

            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("请求传输失败 (attempt {}): {} {}", attempt, path, e);
                    last_transient = Some(AppError::Http(e));
                    Self::backoff(attempt).await;
                    continue;
                }
            };

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!("path: {}, status: {}, response: {}", path, status, body);

            if status.is_success() {
                match serde_json::from_str::<T>(&body) {
                    Ok(parsed) => return Ok(parsed),
                    Err(e) => {
                        // 解码失败按瞬时错误处理
                        warn!("响应解码失败 (attempt {}): {} {}", attempt, path, e);
                        last_transient = Some(AppError::Decode(e));
                        Self::backoff(attempt).await;
                        continue;
                    }
                }
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!("交易所限流/服务端错误 (attempt {}): {} {}", attempt, path, status);
                last_transient = Some(AppError::Transient {
                    attempts: attempt,
                    msg: format!("{} returned {}", path, status),
                });
                Self::backoff(attempt).await;
                continue;
            }

            // 其余4xx解析错误信封，携带交易所错误码直接返回
            return match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(envelope) => Err(AppError::Exchange {
                    code: envelope.code,
                    msg: envelope.msg,
                }),
                Err(e) => Err(AppError::Decode(e)),
            };
        }

        Err(last_transient.unwrap_or(AppError::Transient {
            attempts: MAX_ATTEMPTS,
            msg: "retry budget exhausted".to_string(),
        }))
    }

    async fn backoff(attempt: u32) {
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
        }
    }
}

fn fmt_decimal(d: Decimal) -> String {
    d.normalize().to_string()
}

#[async_trait::async_trait]
impl ExchangeApi for BinanceClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn account_info(&self) -> AppResult<AccountInfo> {
        let raw: RawAccountInfo = self
            .send_request(Method::GET, "/api/v3/account", &[], true)
            .await?;
        Ok(raw.into_account_info())
    }

    async fn open_orders(&self, pair: &str) -> AppResult<Vec<VenueOrder>> {
        let params = [("symbol", pair.to_string())];
        let raw: Vec<RawOrder> = self
            .send_request(Method::GET, "/api/v3/openOrders", &params, true)
            .await?;
        raw.into_iter().map(|o| o.into_venue_order()).collect()
    }

    async fn place_order(&self, req: &PlaceOrderRequest) -> AppResult<VenueOrder> {
        let params = [
            ("symbol", req.pair.clone()),
            ("side", req.side.as_str().to_string()),
            ("type", req.order_type.clone()),
            ("timeInForce", req.time_in_force.clone()),
            ("quantity", fmt_decimal(req.qty)),
            ("price", fmt_decimal(req.price)),
            ("newClientOrderId", req.client_order_id.clone()),
        ];
        let raw: RawOrder = self
            .send_request(Method::POST, "/api/v3/order", &params, true)
            .await?;
        raw.into_venue_order()
    }

    async fn cancel_order(&self, pair: &str, client_order_id: &str) -> AppResult<CancelAck> {
        let params = [
            ("symbol", pair.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        let raw: RawCancelAck = self
            .send_request(Method::DELETE, "/api/v3/order", &params, true)
            .await?;
        Ok(raw.into_cancel_ack(client_order_id))
    }

    async fn current_price(&self, pair: &str) -> AppResult<Decimal> {
        let params = [("symbol", pair.to_string())];
        let raw: RawPrice = self
            .send_request(Method::GET, "/api/v3/ticker/price", &params, false)
            .await?;
        Ok(raw.price)
    }

    async fn my_trades(&self, pair: &str, since_ms: Option<i64>) -> AppResult<Vec<VenueTrade>> {
        let mut params = vec![("symbol", pair.to_string())];
        if let Some(since) = since_ms {
            params.push(("startTime", since.to_string()));
        }
        let raw: Vec<RawTrade> = self
            .send_request(Method::GET, "/api/v3/myTrades", &params, true)
            .await?;
        Ok(raw.into_iter().map(|t| t.into_venue_trade()).collect())
    }

    async fn exchange_info(&self, pair: &str) -> AppResult<PairFilters> {
        let params = [("symbol", pair.to_string())];
        let raw: RawExchangeInfo = self
            .send_request(Method::GET, "/api/v3/exchangeInfo", &params, false)
            .await?;
        raw.into_pair_filters(pair)
    }
}
