use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::model::bar::Period;

pub(crate) fn millis_of(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn instant_of_millis(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .expect("millis out of representable range")
}

/// Render an instant as RFC 3339 (e.g. `2020-01-01T00:00:00Z`) for use in
/// user-visible failure messages, which must match §8's literal test
/// scenarios exactly rather than `time`'s default `Display` format.
pub fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| instant.to_string())
}

/// Extend an instant whose `nanoOfSecond` is exactly zero to the last
/// nanosecond of the *same* second. Any other instant is returned
/// unchanged. This is the "inclusive-to-end-of-second" normalization used
/// for every criteria `end` bound.
pub fn normalize_end_of_second(instant: OffsetDateTime) -> OffsetDateTime {
    if instant.nanosecond() == 0 {
        instant + Duration::nanoseconds(999_999_999)
    } else {
        instant
    }
}

/// Floor `instant` to the start of the hour it falls in.
pub fn floor_to_hour(instant: OffsetDateTime) -> OffsetDateTime {
    let millis = millis_of(instant);
    let hour_millis = 3_600_000;
    instant_of_millis(millis.div_euclid(hour_millis) * hour_millis)
}

/// Floor `instant` to UTC midnight.
pub fn floor_to_day(instant: OffsetDateTime) -> OffsetDateTime {
    let millis = millis_of(instant);
    let day_millis = 86_400_000;
    instant_of_millis(millis.div_euclid(day_millis) * day_millis)
}

/// Floor `instant` to the start of the bar `period` grid cell containing it.
pub fn floor_to_period(instant: OffsetDateTime, period: Period) -> OffsetDateTime {
    let millis = millis_of(instant);
    let duration = period.duration_millis();
    instant_of_millis(millis.div_euclid(duration) * duration)
}

/// Validated, normalized `(symbol, start, end)` window for a tick search.
#[derive(Debug, Clone)]
pub struct TickCriteria {
    pub symbol: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TickCriteria {
    pub fn new(symbol: impl Into<String>, start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, Error> {
        let symbol = symbol.into();
        if symbol.len() < 6 {
            return Err(Error::invalid_argument(format!(
                "symbol {symbol} must be at least 6 characters"
            )));
        }
        let end = normalize_end_of_second(end);
        if end < start {
            return Err(Error::invalid_argument(format!(
                "Instant {} must be before {}",
                format_instant(start),
                format_instant(end)
            )));
        }
        Ok(TickCriteria { symbol, start, end })
    }
}

/// Validated, grid-rounded `(symbol, period, start, end)` window for a bar
/// search, plus the derived day span used to key the bar cache.
#[derive(Debug, Clone)]
pub struct BarCriteria {
    pub symbol: String,
    pub period: Period,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub day_start: OffsetDateTime,
    pub day_end: OffsetDateTime,
    pub num_days: i64,
}

impl BarCriteria {
    pub fn new(
        symbol: impl Into<String>,
        period: Period,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Self, Error> {
        let symbol = symbol.into();
        if symbol.len() < 6 {
            return Err(Error::invalid_argument(format!(
                "symbol {symbol} must be at least 6 characters"
            )));
        }
        if end < start {
            return Err(Error::invalid_argument(format!(
                "Instant {} must be before {}",
                format_instant(start),
                format_instant(end)
            )));
        }

        let start = floor_to_period(start, period);
        let end = round_bar_end(end, period);

        let day_start = floor_to_day(start);
        let day_end_exclusive_midnight = floor_to_day(end) + Duration::days(1);
        let day_end = day_end_exclusive_midnight - Duration::nanoseconds(1);

        let num_days = (millis_of(floor_to_day(end)) - millis_of(day_start)) / 86_400_000 + 1;

        Ok(BarCriteria {
            symbol,
            period,
            start,
            end,
            day_start,
            day_end,
            num_days,
        })
    }

    pub fn day_start_at(&self, i: i64) -> OffsetDateTime {
        assert!(i >= 0 && i < self.num_days, "day index {i} out of range");
        self.day_start + Duration::days(i)
    }

    pub fn day_end_at(&self, i: i64) -> OffsetDateTime {
        assert!(i >= 0 && i < self.num_days, "day index {i} out of range");
        let next_midnight = self.day_start + Duration::days(i + 1);
        next_midnight - Duration::nanoseconds(1)
    }
}

/// `end` rounded to the inclusive end of the bar that contains it: advance
/// by one period, round down to the grid, subtract one second, normalize
/// to end-of-second.
fn round_bar_end(end: OffsetDateTime, period: Period) -> OffsetDateTime {
    let advanced = end + Duration::milliseconds(period.duration_millis());
    let floored = floor_to_period(advanced, period);
    let minus_one_second = floored - Duration::seconds(1);
    normalize_end_of_second(minus_one_second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn end_of_second_extends_to_last_nanosecond_of_same_second() {
        let end = datetime!(2020-01-02 00:59:59 UTC);
        let normalized = normalize_end_of_second(end);
        assert_eq!(normalized, end + Duration::nanoseconds(999_999_999));
    }

    #[test]
    fn end_of_second_leaves_sub_second_instant_untouched() {
        let end = datetime!(2020-01-02 00:59:59.999 UTC);
        assert_eq!(normalize_end_of_second(end), end);
    }

    #[test]
    fn floor_to_hour_truncates_minutes_and_seconds() {
        let instant = datetime!(2020-01-02 05:42:17 UTC);
        assert_eq!(floor_to_hour(instant), datetime!(2020-01-02 05:00:00 UTC));
    }

    #[test]
    fn floor_to_day_truncates_to_midnight() {
        let instant = datetime!(2020-01-02 05:42:17 UTC);
        assert_eq!(floor_to_day(instant), datetime!(2020-01-02 00:00:00 UTC));
    }

    #[test]
    fn bar_criteria_rounds_start_down_and_end_to_bar_boundary() {
        let criteria = BarCriteria::new(
            "EURUSD",
            Period::H1,
            datetime!(2020-01-02 00:30:00 UTC),
            datetime!(2020-01-02 01:30:00 UTC),
        )
        .unwrap();

        assert_eq!(criteria.start, datetime!(2020-01-02 00:00:00 UTC));
        // advance by 1h -> 02:30, floor to H1 -> 02:00, minus 1s -> 01:59:59,
        // normalize (nanoOfSecond==0) -> 01:59:59.999999999
        assert_eq!(
            criteria.end,
            datetime!(2020-01-02 01:59:59 UTC) + Duration::nanoseconds(999_999_999)
        );
    }

    #[test]
    fn bar_criteria_computes_single_day_span() {
        let criteria = BarCriteria::new(
            "EURUSD",
            Period::H1,
            datetime!(2020-01-02 00:00:00 UTC),
            datetime!(2020-01-02 10:00:00 UTC),
        )
        .unwrap();

        assert_eq!(criteria.num_days, 1);
        assert_eq!(criteria.day_start, datetime!(2020-01-02 00:00:00 UTC));
        assert_eq!(criteria.day_start_at(0), criteria.day_start);
    }

    #[test]
    fn bar_criteria_computes_multi_day_span() {
        let criteria = BarCriteria::new(
            "EURUSD",
            Period::H1,
            datetime!(2020-01-02 00:00:00 UTC),
            datetime!(2020-01-04 10:00:00 UTC),
        )
        .unwrap();

        assert_eq!(criteria.num_days, 3);
        assert_eq!(criteria.day_start_at(2), datetime!(2020-01-04 00:00:00 UTC));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = TickCriteria::new(
            "EURUSD",
            datetime!(2020-01-02 01:00:00 UTC),
            datetime!(2020-01-02 00:00:00 UTC),
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::Kind::InvalidArgument);
    }
}
