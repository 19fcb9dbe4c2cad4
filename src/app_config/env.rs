//! 环境变量读取
//!
//! 统一走带默认值的解析入口，缺失与格式错误一律回退默认值，
//! 不在读取处panic。

use std::env;
use std::str::FromStr;

/// 读取环境变量并解析为目标类型；变量缺失或解析失败时回退默认值
pub fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// 开关型环境变量：1/true（忽略大小写）为开启，其余取值为关闭
pub fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true"),
        Err(_) => default,
    }
}
