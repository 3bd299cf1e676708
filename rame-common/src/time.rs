//! Timestamp utilities

use chrono::Utc;

/// Current time as milliseconds since the Unix epoch
///
/// This is the unit of every `refreshed` value.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Round a media length to whole seconds
pub fn whole_seconds(duration: std::time::Duration) -> u64 {
    duration.as_secs_f64().round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_millis_is_recent() {
        let millis = now_millis();
        assert!(millis > 946_684_800_000); // 2000-01-01 00:00:00 UTC
        assert!(millis < 4_102_444_800_000); // 2100-01-01 00:00:00 UTC
    }

    #[tokio::test]
    async fn test_now_millis_advances() {
        let first = now_millis();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = now_millis();
        assert!(second > first);
    }

    #[test]
    fn test_whole_seconds_rounds() {
        assert_eq!(whole_seconds(Duration::from_millis(3016)), 3);
        assert_eq!(whole_seconds(Duration::from_millis(1600)), 2);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }
}
