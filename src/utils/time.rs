use crate::models::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall clock time in milliseconds since the Unix epoch.
/// A clock set before 1970 reads as the epoch itself.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Timestamp)
        .unwrap_or(0)
}

pub fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

pub fn is_expired(timestamp: Timestamp, timeout: i64, current_time: Timestamp) -> bool {
    current_time - timestamp > timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis() {
        let ts = now_millis();
        // After 2020-01-01 and before 2100-01-01
        assert!(ts > 1_577_836_800_000);
        assert!(ts < 4_102_444_800_000);
    }

    #[test]
    fn test_secs_to_millis() {
        assert_eq!(secs_to_millis(0), 0);
        assert_eq!(secs_to_millis(900), 900_000);
        assert_eq!(secs_to_millis(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_is_expired() {
        let current = 10_000;

        assert!(!is_expired(9_500, 1_000, current));
        assert!(is_expired(8_000, 1_000, current));

        // Exactly at the timeout is still valid
        assert!(!is_expired(9_000, 1_000, current));
        assert!(is_expired(8_999, 1_000, current));
    }
}
