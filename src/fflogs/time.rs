/// Timestamp helpers for FFLogs data
///
/// FFLogs reports absolute times as epoch milliseconds and event/fight times
/// as millisecond offsets from the report start. Everything persisted is in
/// epoch seconds.
use chrono::{DateTime, Utc};

/// Epoch milliseconds to epoch seconds
pub fn ms_to_secs(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Absolute epoch seconds for an offset (ms) relative to `report_start` (s)
pub fn absolute_secs(report_start: f64, offset_ms: i64) -> f64 {
    report_start + ms_to_secs(offset_ms)
}

/// Offset in ms from `report_start` (s) to `absolute` (s)
pub fn relative_ms(report_start: f64, absolute: f64) -> i64 {
    ((absolute - report_start) * 1000.0).round() as i64
}

fn to_datetime(epoch_secs: f64) -> Option<DateTime<Utc>> {
    let secs = epoch_secs.floor();
    let nanos = ((epoch_secs - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Wall-clock string (`HH:MM:SS`, UTC) for a fight boundary
pub fn clock_string(epoch_secs: f64) -> String {
    to_datetime(epoch_secs)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Full date-time string (`YYYY-MM-DD HH:MM:SS`, UTC)
pub fn timestamp_to_string(epoch_secs: f64) -> String {
    to_datetime(epoch_secs)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_round_trip() {
        let start = ms_to_secs(1_700_000_000_123);
        let end = absolute_secs(start, 95_500);

        assert!((end - 1_700_000_095.623).abs() < 1e-6);
        assert_eq!(relative_ms(start, end), 95_500);
    }

    #[test]
    fn test_clock_and_date_strings() {
        // 2023-11-14 22:13:20 UTC
        let ts = 1_700_000_000.0;
        assert_eq!(clock_string(ts), "22:13:20");
        assert_eq!(timestamp_to_string(ts), "2023-11-14 22:13:20");
        assert_eq!(clock_string(ts + 0.999), "22:13:20");
    }
}
