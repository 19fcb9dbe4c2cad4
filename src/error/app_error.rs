use thiserror::Error;

/// 交易所错误码：订单已存在（幂等重试时视为成功）
pub const VENUE_DUPLICATE_ORDER: i64 = -2010;
/// 交易所错误码：订单不存在（撤单时静默吸收）
pub const VENUE_UNKNOWN_ORDER: i64 = -2013;

/// 应用错误
#[derive(Error, Debug)]
pub enum AppError {
    /// 交易所业务拒绝，携带交易所错误码，调用方按码分支
    #[error("交易所错误 [{code}]: {msg}")]
    Exchange { code: i64, msg: String },

    /// 交易所响应解码失败（按瞬时错误处理）
    #[error("响应解码失败: {0}")]
    Decode(#[from] serde_json::Error),

    /// 本地校验失败，订单不发往交易所
    #[error("订单校验失败: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Store(#[from] sqlx::Error),

    /// HTTP传输错误
    #[error("HTTP错误: {0}")]
    Http(#[from] reqwest::Error),

    /// 重试耗尽后的瞬时错误
    #[error("瞬时错误，重试{attempts}次后放弃: {msg}")]
    Transient { attempts: u32, msg: String },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// 交易所错误码（非交易所错误返回None）
    pub fn venue_code(&self) -> Option<i64> {
        match self {
            AppError::Exchange { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 是否为"订单已存在"（重复下单，幂等场景视为成功）
    pub fn is_duplicate_order(&self) -> bool {
        self.venue_code() == Some(VENUE_DUPLICATE_ORDER)
    }

    /// 是否为"订单不存在"（撤销已消失的订单）
    pub fn is_unknown_order(&self) -> bool {
        self.venue_code() == Some(VENUE_UNKNOWN_ORDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_code_detection() {
        let dup = AppError::Exchange {
            code: VENUE_DUPLICATE_ORDER,
            msg: "Duplicate order sent.".to_string(),
        };
        assert!(dup.is_duplicate_order());
        assert!(!dup.is_unknown_order());

        let unknown = AppError::Exchange {
            code: VENUE_UNKNOWN_ORDER,
            msg: "Unknown order sent.".to_string(),
        };
        assert!(unknown.is_unknown_order());

        let hard = AppError::Exchange {
            code: -1013,
            msg: "Filter failure: LOT_SIZE".to_string(),
        };
        assert!(!hard.is_duplicate_order());
        assert!(!hard.is_unknown_order());
        assert_eq!(hard.venue_code(), Some(-1013));
    }

    #[test]
    fn test_validation_display() {
        let err = AppError::Validation(vec![
            "price not on tick".to_string(),
            "qty below lot".to_string(),
        ]);
        let msg = format!("{}", err);
        assert!(msg.contains("price not on tick"));
        assert!(msg.contains("qty below lot"));
    }
}
