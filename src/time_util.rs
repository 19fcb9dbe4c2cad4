use chrono::{TimeZone, Utc};

/// 当前毫秒级时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 将毫秒级时间戳转换为可读字符串
pub fn mill_time_to_datetime(timestamp_ms: i64) -> Result<String, String> {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(datetime) => {
            let formatted_datetime = datetime.format("%Y-%m-%d %H:%M:%S").to_string();
            Ok(formatted_datetime)
        }
        chrono::LocalResult::None => Err("Invalid timestamp: None".to_string()),
        chrono::LocalResult::Ambiguous(_, _) => Err("Invalid timestamp: Ambiguous".to_string()),
    }
}

/// 将毫秒时间戳编码为base36（小写字母+数字），按时间可排序
pub fn millis_to_base36(mut value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ascii")
}
