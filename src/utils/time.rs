use chrono::{DateTime, Local};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Local calendar date in the form stored on issued keys (`YYYY-MM-DD`)
pub fn today() -> String {
    format_date(&Local::now())
}

pub fn format_date(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn now_local() -> DateTime<Local> {
    Local::now()
}
