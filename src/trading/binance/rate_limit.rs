//! 请求权重令牌桶
//!
//! 交易所按分钟限制请求权重；桶容量1200，每60秒匀速补满。
//! 补充按时间插值计算，acquire在令牌不足时挂起等待而不是报错。

use std::time::Instant;

use tokio::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 令牌桶限流器
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_minute as f64 / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 交易所默认限额：1200权重/分钟
    pub fn venue_default() -> Self {
        Self::new(1200, 1200)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// 获取n个令牌，不足时挂起直到补充足够
    pub async fn acquire(&self, n: u32) {
        let need = n as f64;
        loop {
            let wait_secs = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= need {
                    state.tokens -= need;
                    return;
                }
                (need - state.tokens) / self.refill_per_sec
            };
            // 锁外等待，等待时长由补充速率决定
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.01))).await;
        }
    }

    /// 当前可用令牌数（测试与监控用）
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }
}
