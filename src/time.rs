//! Conversions between the core's internal epoch-millisecond arithmetic
//! and the ISO-8601 UTC representation used at the persistence boundary
//! (§3: "Time values are ISO-8601 UTC for persistence, epoch-millis for
//! internal arithmetic").

use chrono::{DateTime, Utc};

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Renders an epoch-ms timestamp as an ISO-8601 UTC string, e.g.
/// `"2026-07-27T00:00:00.000Z"`.
pub fn to_iso8601(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap())
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 UTC string back into epoch milliseconds. Returns
/// `None` on anything unparseable; callers at the persistence boundary
/// treat that as a corrupt row, not a panic.
pub fn from_iso8601(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let ms = 1_700_000_000_123;
        let iso = to_iso8601(ms);
        assert_eq!(from_iso8601(&iso), Some(ms));
    }

    #[test]
    fn test_from_iso8601_rejects_garbage() {
        assert_eq!(from_iso8601("not-a-timestamp"), None);
    }
}
