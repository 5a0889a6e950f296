//! Decides whether an instant falls inside the global FX trading week.
//!
//! This is the only module that needs a real IANA timezone database (for
//! `Australia/Sydney` and `America/New_York` with DST); the rest of the
//! crate works entirely in UTC via `time::OffsetDateTime`.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::{America, Australia};
use time::OffsetDateTime;

/// Whether the global FX market is open at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Closed,
}

impl MarketStatus {
    pub fn is_open(self) -> bool {
        matches!(self, MarketStatus::Open)
    }
}

/// Stateless oracle for FX market hours: open between Sydney 09:00 Monday
/// and New York 17:00 Friday, local time, DST-aware.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarketStatusOracle;

impl MarketStatusOracle {
    pub fn new() -> Self {
        MarketStatusOracle
    }

    pub fn status(&self, instant: OffsetDateTime) -> MarketStatus {
        if is_after_sydney_week_start(instant) && is_before_new_york_week_end(instant) {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        }
    }

    pub fn is_open(&self, instant: OffsetDateTime) -> bool {
        self.status(instant).is_open()
    }
}

fn to_chrono_utc(instant: OffsetDateTime) -> DateTime<Utc> {
    let nanos = instant.unix_timestamp_nanos();
    let secs = nanos.div_euclid(1_000_000_000) as i64;
    let subsec_nanos = nanos.rem_euclid(1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subsec_nanos)
        .single()
        .expect("tick instant out of chrono's representable range")
}

fn is_after_sydney_week_start(instant: OffsetDateTime) -> bool {
    let utc = to_chrono_utc(instant);
    let sydney = utc.with_timezone(&Australia::Sydney);

    match sydney.weekday() {
        Weekday::Sun => false,
        Weekday::Mon => sydney.hour() >= 9,
        other => {
            let days_since_monday = other.num_days_from_monday() as i64;
            let monday_date = sydney.date_naive() - ChronoDuration::days(days_since_monday);
            let monday_open = Australia::Sydney
                .from_local_datetime(&monday_date.and_hms_opt(9, 0, 0).unwrap())
                .single()
                .expect("valid Sydney Monday 09:00 local time");
            utc > monday_open.with_timezone(&Utc)
        }
    }
}

fn is_before_new_york_week_end(instant: OffsetDateTime) -> bool {
    let utc = to_chrono_utc(instant);
    let ny = utc.with_timezone(&America::New_York);

    match ny.weekday() {
        Weekday::Sat => false,
        Weekday::Fri => ny.hour() < 17,
        other => {
            let days_until_friday =
                (4i64 - other.num_days_from_monday() as i64).rem_euclid(7);
            let friday_date = ny.date_naive() + ChronoDuration::days(days_until_friday);
            let friday_close = America::New_York
                .from_local_datetime(&friday_date.and_hms_opt(17, 0, 0).unwrap())
                .single()
                .expect("valid New York Friday 17:00 local time");
            utc < friday_close.with_timezone(&Utc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn sydney_monday_open_boundary() {
        let oracle = MarketStatusOracle::new();
        // 2019-06-03T08:00:00+10:00 and 09:00:00+10:00
        assert!(!oracle.is_open(datetime!(2019-06-02 22:00:00 UTC))); // 08:00 Sydney
        assert!(oracle.is_open(datetime!(2019-06-02 23:00:00 UTC))); // 09:00 Sydney
    }

    #[test]
    fn new_york_friday_close_boundary() {
        let oracle = MarketStatusOracle::new();
        // 2019-06-07T16:59:59-04:00 (EDT) and 17:01:00-04:00
        assert!(oracle.is_open(datetime!(2019-06-07 20:59:59 UTC)));
        assert!(!oracle.is_open(datetime!(2019-06-07 21:01:00 UTC)));
    }

    #[test]
    fn sydney_monday_open_boundary_winter_dst() {
        let oracle = MarketStatusOracle::new();
        // 2019-02-04T09:00:00+11:00 and 08:59:59+11:00 (AEDT, summer in southern hemisphere)
        assert!(oracle.is_open(datetime!(2019-02-03 22:00:00 UTC)));
        assert!(!oracle.is_open(datetime!(2019-02-03 21:59:59 UTC)));
    }

    #[test]
    fn weekend_is_always_closed() {
        let oracle = MarketStatusOracle::new();
        assert!(!oracle.is_open(datetime!(2020-01-04 12:00:00 UTC))); // Saturday
    }
}
