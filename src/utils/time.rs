//! Time helpers shared by the services
//!
//! Conversions between RPC unix timestamps and `chrono` values, plus the
//! freshness checks used by the caches.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a Unix timestamp in seconds (as returned by RPC `blockTime`)
pub fn from_unix_timestamp(timestamp: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0).single()
}

/// True when `at` is within `ttl` of `now`
pub fn is_fresh(at: &DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(*at) < ttl
}

/// UTC calendar day of a timestamp
pub fn utc_day(dt: &DateTime<Utc>) -> NaiveDate {
    dt.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_conversion() {
        let dt = from_unix_timestamp(1_714_564_800).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(utc_day(&dt), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_freshness() {
        let now = from_unix_timestamp(1_714_564_800).unwrap();
        let earlier = now - Duration::seconds(90);

        assert!(is_fresh(&earlier, Duration::minutes(5), now));
        assert!(!is_fresh(&earlier, Duration::seconds(60), now));
    }
}
