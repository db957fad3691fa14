//! Epoch timestamp helpers shared by the CLI and the status surface

use chrono::{DateTime, Local, TimeZone, Utc};

/// Current time as epoch seconds
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Render an epoch timestamp in local time, or `"never"` for `None`
pub fn format_local(ts: Option<i64>) -> String {
    match ts.and_then(|ts| Local.timestamp_opt(ts, 0).single()) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

/// Render a duration in seconds as `1h 02m 03s`
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// UTC datetime for an epoch timestamp
pub fn to_utc(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}
