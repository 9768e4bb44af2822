use chrono::{DateTime, NaiveDateTime};

use crate::types::TimestampMs;

/// Normalises a feed timestamp to epoch milliseconds.
///
/// Accepts RFC 3339 (`2025-03-14T09:30:00.125Z`), a naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC, or a bare integer already in
/// epoch milliseconds. Returns `None` for anything else.
pub fn parse_feed_time(raw: &str) -> Option<TimestampMs> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ms) = raw.parse::<u64>() {
        return Some(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return u64::try_from(dt.timestamp_millis()).ok();
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return u64::try_from(naive.and_utc().timestamp_millis()).ok();
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_millis() {
        assert_eq!(parse_feed_time("1710408600125"), Some(1_710_408_600_125));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_feed_time("2024-03-14T10:30:00.125+01:00"),
            Some(1_710_408_600_125)
        );
        assert_eq!(
            parse_feed_time("2024-03-14T09:30:00.125Z"),
            Some(1_710_408_600_125)
        );
    }

    #[test]
    fn parses_naive_as_utc() {
        assert_eq!(
            parse_feed_time("2024-03-14 09:30:00.125"),
            Some(1_710_408_600_125)
        );
        assert_eq!(parse_feed_time("2024-03-14 09:30:00"), Some(1_710_408_600_000));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_feed_time(""), None);
        assert_eq!(parse_feed_time("09:30"), None);
        assert_eq!(parse_feed_time("-15"), None);
    }
}
