use chrono::{DateTime, Utc};

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn secs_to_millis(secs: i64) -> i64 {
    secs.saturating_mul(1000)
}
